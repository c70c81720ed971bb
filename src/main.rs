use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};

use barebones_direct::config::{parse_color, parse_dimension, parse_size};
use barebones_direct::vr::TrackingPolicy;
use barebones_direct::{App, Config, Size};

#[derive(Parser, Debug)]
#[command(author, version, about = "Clears an OpenXR headset and its mirror window to a solid colour", long_about = None)]
struct Args {
    /// Window width in pixels
    #[arg(long, default_value = "1280", value_parser = parse_dimension)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value = "720", value_parser = parse_dimension)]
    height: u32,

    /// Window back buffer size, used when the surface lets us choose
    #[arg(long, value_name = "WxH", default_value = "1920x1080", value_parser = parse_size)]
    back_buffer: Size,

    /// Clear colour as R,G,B[,A] in 0..=1
    #[arg(long, value_name = "R,G,B[,A]", default_value = "0,1,0,1", value_parser = parse_color)]
    clear_color: [f32; 4],

    /// Query headset tracking only once instead of every frame
    #[arg(long)]
    track_once: bool,

    /// Do not clear or present the desktop window
    #[arg(long)]
    no_mirror: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            window_size: Size::new(self.width, self.height),
            back_buffer_size: self.back_buffer,
            clear_color: self.clear_color,
            tracking: if self.track_once {
                TrackingPolicy::Once
            } else {
                TrackingPolicy::EveryFrame
            },
            mirror_to_window: !self.no_mirror,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    let result = App::bootstrap(args.into_config()).and_then(|mut app| app.run());
    match result {
        Ok(()) => {
            info!("Exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            err.exit_code()
        }
    }
}
