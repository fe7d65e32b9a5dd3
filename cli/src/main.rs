mod logger;
mod progress_window;

use progress_window::ProgressWindow;
use structopt::StructOpt;

use neural_style::{
    ContentLayerPolicy, DefaultBackend, DivergencePolicy, Error, SessionBuilder, TransferProgress,
};
use std::path::PathBuf;

fn parse_content_policy(input: &str) -> Result<ContentLayerPolicy, String> {
    match input {
        "last" => Ok(ContentLayerPolicy::LastLayer),
        "sum" => Ok(ContentLayerPolicy::Sum),
        other => Err(format!(
            "content policy `{}` not one of: 'last', 'sum'",
            other
        )),
    }
}

#[derive(StructOpt)]
#[structopt(
    name = "neural-style",
    about = "Paints the content of one image in the style of another",
    rename_all = "kebab-case"
)]
struct Opt {
    /// Path or URL of the image whose content is kept
    #[structopt(short, long)]
    content: String,
    /// Path or URL of the image whose style is transferred
    #[structopt(short, long)]
    style: String,
    /// The path to save the stylized image to, the file extension of the
    /// path determines the image format used
    #[structopt(short, long, parse(from_os_str))]
    result: PathBuf,
    /// The number of optimization steps
    #[structopt(short, long, default_value = "2000")]
    epoch: usize,
    /// Weight of the content loss
    #[structopt(short, long, default_value = "1")]
    alpha: f32,
    /// Weight of the style loss
    #[structopt(short, long, default_value = "1000000")]
    beta: f32,
    /// Step size of the optimizer
    #[structopt(long, default_value = "0.003")]
    lr: f64,
    /// A PyTorch file with the weights of torchvision's VGG-19. Without it the
    /// network is randomly initialized.
    #[structopt(short, long, parse(from_os_str))]
    weights: Option<PathBuf>,
    /// Input images are downscaled so that their longer side is at most this
    /// many pixels
    #[structopt(long, default_value = "512")]
    max_size: u32,
    /// How several content layers are combined, either `last` or `sum`
    #[structopt(long, default_value = "last", parse(try_from_str = parse_content_policy))]
    content_policy: ContentLayerPolicy,
    /// Keep going when an iteration produces a NaN or infinite loss, instead
    /// of stopping with an error
    #[structopt(long)]
    skip_divergent: bool,
    /// Hide the progress bar
    #[structopt(long)]
    no_progress: bool,
    /// Also log the content and style loss of every iteration
    #[structopt(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn real_main() -> Result<(), Error> {
    let args = Opt::from_args();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = logger::init_log(level) {
        eprintln!("unable to initialize logging: {}", e);
    }

    // Check that the extension for the path supplied by the user is one of the ones we support
    match args.result.extension().and_then(|ext| ext.to_str()) {
        Some("png") | Some("jpg") | Some("jpeg") | Some("bmp") => {}
        Some(other) => return Err(Error::UnsupportedOutputFormat(other.to_owned())),
        None => return Err(Error::UnsupportedOutputFormat(String::new())),
    }

    // Fail on an unwritable destination before any optimization
    neural_style::prepare_output(&args.result)?;

    let mut sb = SessionBuilder::new()
        .content(args.content.as_str())
        .style(args.style.as_str())
        .iterations(args.epoch)
        .content_weight(args.alpha)
        .style_weight(args.beta)
        .learning_rate(args.lr)
        .max_size(args.max_size)
        .content_policy(args.content_policy);

    if args.skip_divergent {
        sb = sb.divergence_policy(DivergencePolicy::Skip);
    }

    if let Some(ref weights) = args.weights {
        sb = sb.weights(weights);
    }

    let device = Default::default();
    let session = sb.build::<DefaultBackend>(&device)?;

    let progress: Option<Box<dyn TransferProgress>> = if !args.no_progress {
        Some(Box::new(ProgressWindow::new(args.epoch)))
    } else {
        None
    };

    let stylized = session.run(progress)?;
    stylized.save(&args.result)?;

    log::info!("saved {}", args.result.display());

    Ok(())
}
