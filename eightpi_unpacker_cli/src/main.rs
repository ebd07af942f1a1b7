use clap::{Arg, Command};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use libeightpi_unpacker::config::Settings;
use libeightpi_unpacker::error::ProcessorError;
use libeightpi_unpacker::midas_file::MidasFileManager;
use libeightpi_unpacker::processor::MidasEventProcessor;
use libeightpi_unpacker::sink::{CountingSink, EventSink, TsvSink};

fn make_template_config(path: &Path) {
    let settings = Settings::default();
    let yaml_str = serde_yaml::to_string(&settings).unwrap();
    let mut file = File::create(path).expect("Could not create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

/// Unpack one MIDAS file, reporting the read position through `progress`.
fn run(
    settings: Settings,
    input: PathBuf,
    output: Option<PathBuf>,
    progress: Arc<Mutex<f32>>,
) -> Result<String, ProcessorError> {
    let mut manager = MidasFileManager::open(&input)?;
    let header = manager.read_file_header()?;
    spdlog::info!(
        "run {} started at unix time {}",
        header.run_number,
        header.start_time
    );

    let sink: Box<dyn EventSink> = match output {
        Some(path) => Box::new(TsvSink::new(BufWriter::new(File::create(path)?))?),
        None => Box::new(CountingSink::default()),
    };
    let mut processor = MidasEventProcessor::new(settings, sink);

    while let Some(event) = manager.next_event()? {
        if !processor.process(&event)? {
            break;
        }
        if let Ok(mut fraction) = progress.lock() {
            *fraction = manager.position() as f32 / manager.size() as f32;
        }
    }

    let mut report = processor.flush();
    report.push_str(&format!(
        "resynchronizations: {}\n",
        manager.resynchronizations()
    ));
    Ok(report)
}

fn main() {
    let matches = Command::new("eightpi_unpacker_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .help("Path to the MIDAS file to unpack"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Path for tab-separated hit output (optional)"),
        )
        .get_matches();

    spdlog::init_env_level().ok();

    let config_path = PathBuf::from(matches.get_one::<String>("config").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        spdlog::info!("Done.");
        return;
    }

    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let settings = match Settings::read_config_file(&config_path) {
        Ok(settings) => settings,
        Err(error) => {
            spdlog::error!("{error}");
            return;
        }
    };
    spdlog::info!("Config successfully loaded.");

    let input = PathBuf::from(
        matches
            .get_one::<String>("input")
            .expect("An input MIDAS file is required"),
    );
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    spdlog::info!("Unpacking {}...", input.to_string_lossy());
    if let Some(path) = &output {
        spdlog::info!("Writing hits to {}", path.to_string_lossy());
    }

    let progress_bar = ProgressBar::new(100);
    let progress = Arc::new(Mutex::new(0.0f32));
    let sent_progress = progress.clone();
    let handle = std::thread::spawn(move || run(settings, input, output, sent_progress));

    loop {
        std::thread::sleep(std::time::Duration::from_millis(500));
        match progress.lock() {
            Ok(fraction) => progress_bar.set_position((*fraction * 100.0) as u64),
            Err(error) => spdlog::error!("{error}"),
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(Ok(report)) => {
                    spdlog::info!("Successfully unpacked the run!");
                    print!("{report}");
                }
                Ok(Err(error)) => spdlog::error!("Unpacking failed with error: {error}"),
                Err(_) => spdlog::error!("Failed to join the unpacking task!"),
            }
            break;
        }
    }

    progress_bar.finish();
    spdlog::info!("Done.");
}
