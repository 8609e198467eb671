//! Host-side driver for the BSC-style ERC link: upload/download files and
//! issue system commands, or run the server loop against a directory.

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use yasnac_erc::bsc::{BscEngine, BscEngineError, BscTransactionLayer, ExecResult, TransactionError};
use yasnac_erc::fs::{FilesystemAdapter, OverwritePolicy};
use yasnac_erc::link::SerialLink;

/// Drive a YASNAC ERC-series robot controller over its BSC-style link.
#[derive(Parser, Debug)]
#[command(name = "erc-drive", version, about)]
struct Args {
    /// Serial port to open.
    #[arg(short, long, default_value = "/dev/ttyS0")]
    port: String,

    /// Baud rate.
    #[arg(short, long, default_value_t = 9600)]
    baud: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file to the robot.
    Put { file: String },
    /// Download a file from the robot.
    Get { file: String },
    /// Issue a system control command and print its response.
    Exec { text: String },
    /// Run the BSC server loop against the working directory.
    Serve,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let link = match SerialLink::open(&args.port, args.baud) {
        Ok(link) => link,
        Err(e) => {
            error!("failed to open {}: {}", args.port, e);
            std::process::exit(1);
        }
    };

    let fs = FilesystemAdapter::new(".", None, OverwritePolicy::Deny);
    let engine = BscEngine::new(link);
    let mut txn = BscTransactionLayer::new(engine, fs);

    let result = match args.command {
        Command::Put { file } => txn.put_file(&file, None, true),
        Command::Get { file } => txn.get_file(&file, None),
        Command::Exec { text } => match txn.execute_command(&text) {
            Ok(ExecResult::Success) => {
                println!("0000");
                Ok(())
            }
            Ok(ExecResult::Error(message)) => {
                println!("{message}");
                Ok(())
            }
            Ok(ExecResult::Data(fields)) => {
                println!("{}", fields.join(","));
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Serve => serve(&mut txn),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn serve<L: yasnac_erc::link::Link>(
    txn: &mut BscTransactionLayer<L>,
) -> Result<(), TransactionError> {
    info!("serving BSC transactions against the working directory");
    loop {
        match txn.serve_one() {
            Ok(()) => continue,
            Err(TransactionError::Engine(BscEngineError::Link(e))) => {
                return Err(TransactionError::Engine(BscEngineError::Link(e)));
            }
            Err(e) => {
                warn!("transaction error, continuing: {e}");
                continue;
            }
        }
    }
}
