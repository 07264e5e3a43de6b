use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, Command};
use log::{error, info};

use loopcam::device::DeviceConfig;
use loopcam::frame::Frame;
use loopcam::manager::{DeviceManager, ManagerConfig};
use loopcam::pacer::FramePacer;
use loopcam_utils::framegen::FrameGenerator;

fn parse_size(s: &str) -> anyhow::Result<(u32, u32)> {
    let (width, height) = s
        .split_once('x')
        .ok_or_else(|| anyhow!("invalid frame size {:?}, expected e.g. 1280x720", s))?;

    Ok((width.parse()?, height.parse()?))
}

fn run() -> anyhow::Result<()> {
    let matches = Command::new("Loopback test pattern")
        .about("Creates a virtual camera and feeds it a moving test pattern")
        .arg(
            Arg::new("label")
                .long("label")
                .takes_value(true)
                .default_value("Loopcam Virtual Camera")
                .help("Name under which the camera is advertised"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .takes_value(true)
                .default_value("30")
                .value_parser(clap::value_parser!(u32))
                .help("Number of frames presented per second"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .takes_value(true)
                .value_parser(clap::value_parser!(u64))
                .help("Stop after presenting a given number of frames"),
        )
        .arg(
            Arg::new("frame_size")
                .long("size")
                .takes_value(true)
                .default_value("1280x720")
                .help("Size of the frames to present (e.g. \"1280x720\")"),
        )
        .arg(
            Arg::new("no_sudo")
                .long("no-sudo")
                .action(ArgAction::SetTrue)
                .help("Run modprobe directly instead of through sudo"),
        )
        .get_matches();

    let label = matches
        .get_one::<String>("label")
        .cloned()
        .unwrap_or_default();
    let fps = matches
        .get_one::<u32>("fps")
        .copied()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| anyhow!("invalid frame rate"))?;
    let stop_after = matches.get_one::<u64>("frames").copied();
    let (width, height) = parse_size(
        matches
            .get_one::<String>("frame_size")
            .map(String::as_str)
            .unwrap_or("1280x720"),
    )?;
    let use_sudo = !matches.get_one::<bool>("no_sudo").copied().unwrap_or(false);

    let lets_quit = Arc::new(AtomicBool::new(false));
    // Setup the Ctrl+c handler.
    {
        let lets_quit_handler = lets_quit.clone();
        ctrlc::set_handler(move || {
            lets_quit_handler.store(true, Ordering::SeqCst);
        })
        .context("Failed to set Ctrl-C handler")?;
    }

    let config = ManagerConfig::new(label)
        .use_sudo(use_sudo)
        .device(DeviceConfig::new().size(width, height));
    let mut manager =
        DeviceManager::with_config(config).context("Failed to create the virtual camera")?;
    let device = manager.get_device()?;

    let format = *device.format();
    let stride = std::cmp::max(format.bytesperline as usize, format.width as usize * 2);
    let mut generator = FrameGenerator::new(format.width as usize, format.height as usize, stride)?;
    let mut frame = Frame::with_size(generator.frame_size());

    info!(
        "Presenting {} at {} fps on {}, press Ctrl-C to stop",
        format,
        fps,
        device.path().display()
    );

    while !lets_quit.load(Ordering::SeqCst) {
        if stop_after.map_or(false, |max| device.frames_displayed() >= max) {
            break;
        }

        let _pacer = FramePacer::new(fps);
        generator.next_frame(&mut frame)?;
        device.display_frame(&frame)?;
    }

    info!("Presented {} frames", device.frames_displayed());

    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
