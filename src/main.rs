use crate::config::{PlayerConfig, app_name, version};
use crate::pipeline::PlaybackCoordinator;
use clap::{Arg, Command, value_parser};
use std::{panic, process};

pub mod assets;
pub mod config;
pub mod decoder;
pub mod display;
pub mod pipeline;

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Plays the first audio and video stream of a media file in sync")
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .help("Media file to play.")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("JSON file with playback settings.")
                .required(false),
        )
        .arg(
            Arg::new("audio-buffer")
                .short('b')
                .long("audio-buffer")
                .value_name("FRAMES")
                .help("Audio device buffer size hint, in sample frames.")
                .value_parser(value_parser!(u32).range(1..))
                .required(false),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match PlayerConfig::load(path) {
            Ok(config) => config,
            Err(e) => fail(e),
        },
        None => PlayerConfig::default(),
    };
    if let Some(frames) = matches.get_one::<u32>("audio-buffer") {
        config.audio_buffer_frames = *frames;
    }

    let Some(input) = matches.get_one::<String>("input").cloned() else {
        fail(anyhow::anyhow!("no input file given"));
    };

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // invoke the default handler and exit the process
        orig_hook(panic_info);
        process::exit(105);
    }));

    // stop playback immediately on SIGINT, SIGTERM, or SIGHUP
    ctrlc::set_handler(move || {
        process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => fail(e.into()),
    };

    let result = runtime.block_on(async move {
        let mut coordinator = PlaybackCoordinator::new(config);
        coordinator.play(input).await
    });

    match result {
        Ok(report) => log::info!("Playback finished: {}", report),
        Err(e) => fail(e),
    }
}

fn fail(e: anyhow::Error) -> ! {
    log::error!("{:#}", e);
    eprintln!("{}: {:#}", app_name(), e);
    process::exit(1);
}
