//! FC1 floppy disk controller emulator: serves a YASNAC ERC-series robot's
//! FC1 drive port from host-side storage.

use clap::Parser;
use log::{error, info};

use yasnac_erc::fc1::Fc1Engine;
use yasnac_erc::fs::{FilesystemAdapter, OverwritePolicy};
use yasnac_erc::link::SerialLink;

/// Emulate an FC1 floppy disk controller on a serial line.
#[derive(Parser, Debug)]
#[command(name = "motodisk", version, about)]
struct Args {
    /// Serial port to open.
    #[arg(short, long, default_value = "/dev/ttyS0")]
    port: String,

    /// Baud rate.
    #[arg(short, long, default_value_t = 4800)]
    baud: u32,

    /// Allow overwriting existing files on FWT instead of renaming.
    #[arg(short, long)]
    overwrite: bool,

    /// Restrict LST/FRD to these filenames. If empty, LST enumerates all
    /// eligible `*.JBI` files in the working directory.
    whitelist: Vec<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let overwrite = if args.overwrite {
        OverwritePolicy::Allow
    } else {
        OverwritePolicy::Deny
    };
    let whitelist = if args.whitelist.is_empty() {
        None
    } else {
        Some(args.whitelist)
    };

    let fs = FilesystemAdapter::new(".", whitelist, overwrite);

    info!("opening {} at {} baud", args.port, args.baud);
    let link = match SerialLink::open(&args.port, args.baud) {
        Ok(link) => link,
        Err(e) => {
            error!("failed to open {}: {}", args.port, e);
            std::process::exit(1);
        }
    };

    let mut engine = Fc1Engine::new(link, fs);
    match engine.serve() {
        Ok(()) => {}
        Err(e) => {
            error!("session ended: {}", e);
            std::process::exit(1);
        }
    }
}
