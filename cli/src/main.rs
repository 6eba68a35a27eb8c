//! `frescoctl` entry
//!
//! The cli program to communicate with frescod.

mod cli;

use std::error::Error;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use clap::Parser;

fn socket_path() -> PathBuf {
    let dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(dir).join("frescod.sock")
}

fn list_monitors() -> Result<(), Box<dyn Error>> {
    for display in display_info::DisplayInfo::all()? {
        println!(
            "{} {}x{}+{}+{}{}",
            display.name,
            display.width,
            display.height,
            display.x,
            display.y,
            if display.is_primary { " primary" } else { "" }
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let parsed = cli::Cli::parse();
    let Some(line) = parsed.command.to_line() else {
        return list_monitors();
    };

    let mut conn = UnixStream::connect(socket_path())
        .inspect_err(|_| eprintln!("cannot reach frescod, is it running?"))?;
    conn.write_all(line.as_bytes())?;
    // The daemon reads until EOF of our half before replying.
    conn.shutdown(Shutdown::Write)?;
    let mut reply = String::new();
    conn.read_to_string(&mut reply)?;
    println!("{reply}");
    Ok(())
}
