//! Conversion between image files and the normalized tensors the network
//! consumes.

use crate::{Dims, Error};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use std::path::Path;

/// Helper type used to define the source of an image
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// A URL or a path. With the `remote` feature enabled the location is
    /// first fetched over the network, and opened from disk if that fails
    /// for any reason
    Location(&'a str),
    /// An already loaded image that is passed directly to the session
    Image(image::DynamicImage),
}

impl<'a> ImageSource<'a> {
    pub fn from_path(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<image::DynamicImage> for ImageSource<'a> {
    fn from(img: image::DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a> From<&'a str> for ImageSource<'a> {
    fn from(location: &'a str) -> Self {
        Self::Location(location)
    }
}

impl<'a> From<&'a Path> for ImageSource<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<&'a std::path::PathBuf> for ImageSource<'a> {
    fn from(path: &'a std::path::PathBuf) -> Self {
        Self::Path(path.as_path())
    }
}

impl<'a> From<&'a String> for ImageSource<'a> {
    fn from(location: &'a String) -> Self {
        Self::Location(location.as_str())
    }
}

#[cfg(feature = "remote")]
fn fetch(url: &str) -> Result<image::DynamicImage, String> {
    let response = reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .map_err(|err| err.to_string())?;
    let bytes = response.bytes().map_err(|err| err.to_string())?;

    image::load_from_memory(&bytes).map_err(|err| err.to_string())
}

#[cfg(not(feature = "remote"))]
fn fetch(_url: &str) -> Result<image::DynamicImage, String> {
    Err("remote fetching is disabled".to_owned())
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<image::DynamicImage, Error> {
    match src {
        ImageSource::Memory(data) => Ok(image::load_from_memory(data)?),
        ImageSource::Path(path) => {
            image::open(path).map_err(|err| Error::resource("read the image", path, err))
        }
        ImageSource::Location(location) => match fetch(location) {
            Ok(img) => Ok(img),
            Err(fetch_err) => {
                log::debug!("fetching '{}' failed ({}), trying disk", location, fetch_err);

                image::open(location).map_err(|open_err| {
                    Error::Fetch(format!(
                        "'{}' could not be fetched ({}) or opened ({})",
                        location, fetch_err, open_err
                    ))
                })
            }
        },
        ImageSource::Image(img) => Ok(img),
    }
}

/// Makes sure an image can later be written to `path`, so that an unwritable
/// destination is reported before any time is spent on the optimization.
///
/// Missing parent directories are created. The file itself is only left
/// behind if it already existed.
pub fn prepare_output<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    let path = path.as_ref();
    let stage = "open the result for writing";

    if let Some(parent_path) = path.parent() {
        std::fs::create_dir_all(parent_path).map_err(|err| Error::resource(stage, path, err))?;
    }

    let existed = path.exists();
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .map_err(|err| Error::resource(stage, path, err))?;

    if !existed {
        std::fs::remove_file(path).map_err(|err| Error::resource(stage, path, err))?;
    }

    Ok(())
}

/// Writes an image, creating parent directories. The format is inferred from
/// the extension.
pub(crate) fn save_image(img: &image::RgbImage, path: &Path) -> Result<(), Error> {
    let stage = "write the image";

    if let Some(parent_path) = path.parent() {
        std::fs::create_dir_all(parent_path).map_err(|err| Error::resource(stage, path, err))?;
    }

    img.save(path).map_err(|err| Error::resource(stage, path, err))
}

/// Computes the size of an image whose longer side is at most `max_size`,
/// keeping the aspect ratio. Images are never upscaled.
pub(crate) fn fit_within(dims: Dims, max_size: u32) -> Dims {
    let longest = dims.width.max(dims.height);
    if longest <= max_size {
        return dims;
    }

    let scale = f64::from(max_size) / f64::from(longest);
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);

    Dims::new(scaled(dims.width), scaled(dims.height))
}

pub(crate) fn load_image(src: ImageSource<'_>, max_size: u32) -> Result<image::RgbImage, Error> {
    let img = load_dynamic_image(src)?.to_rgb8();

    let size = fit_within(Dims::new(img.width(), img.height()), max_size);
    let img = if size.width != img.width() || size.height != img.height() {
        image::imageops::resize(
            &img,
            size.width,
            size.height,
            image::imageops::FilterType::CatmullRom,
        )
    } else {
        img
    };

    Ok(img)
}

/// Channel-wise shift applied to images before they enter the network.
///
/// The same constants must be used to decode the canvas, otherwise the
/// colors of the result drift away from both inputs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// The statistics of the ImageNet training set, which VGG was trained on
    pub const IMAGENET: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };
}

impl Default for Normalization {
    fn default() -> Self {
        Self::IMAGENET
    }
}

/// A 3 channel image stored channel-major in normalized color space.
#[derive(Clone, Debug)]
pub struct ImageTensor {
    data: Vec<f32>,
    dims: Dims,
    normalization: Normalization,
}

impl ImageTensor {
    pub fn from_image(img: &image::RgbImage, normalization: Normalization) -> Self {
        let (width, height) = img.dimensions();
        let plane = width as usize * height as usize;
        let mut data = vec![0.0; plane * 3];

        for (i, pixel) in img.pixels().enumerate() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                data[c * plane + i] = (value - normalization.mean[c]) / normalization.std[c];
            }
        }

        Self {
            data,
            dims: Dims::new(width, height),
            normalization,
        }
    }

    /// Loads, resizes and normalizes an image
    pub fn load(
        src: ImageSource<'_>,
        max_size: u32,
        normalization: Normalization,
    ) -> Result<Self, Error> {
        let img = load_image(src, max_size)?;
        Ok(Self::from_image(&img, normalization))
    }

    /// Inverts the normalization and quantizes back to 8 bits per channel
    pub fn to_image(&self) -> image::RgbImage {
        let plane = self.dims.width as usize * self.dims.height as usize;
        let norm = &self.normalization;

        let mut img = image::RgbImage::new(self.dims.width, self.dims.height);
        for (i, pixel) in img.pixels_mut().enumerate() {
            for c in 0..3 {
                let value = self.data[c * plane + i] * norm.std[c] + norm.mean[c];
                pixel[c] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }

        img
    }

    /// Saves the image to the specified path, the format is inferred from
    /// the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        save_image(&self.to_image(), path.as_ref())
    }

    /// Converts to a `[1, 3, height, width]` tensor
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let shape = [1, 3, self.dims.height as usize, self.dims.width as usize];
        Tensor::from_data(TensorData::new(self.data.clone(), shape), device)
    }

    /// Reads back a `[1, 3, height, width]` tensor that is in the color space
    /// described by `normalization`
    pub fn from_tensor<B: Backend>(
        tensor: Tensor<B, 4>,
        normalization: Normalization,
    ) -> Result<Self, Error> {
        let dims = tensor.dims();
        if dims[0] != 1 || dims[1] != 3 {
            return Err(Error::InvalidShape {
                expected: 3,
                actual: dims.to_vec(),
            });
        }

        let data: Vec<f32> = tensor.into_data().iter::<f32>().collect();

        Ok(Self {
            data,
            dims: Dims::new(dims[3] as u32, dims[2] as u32),
            normalization,
        })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}
