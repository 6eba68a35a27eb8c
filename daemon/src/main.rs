use std::error::Error;

use frescod::daemon;
use frescod::winsys::X11WindowSystem;

fn main() -> Result<(), Box<dyn Error>> {
    let ws = X11WindowSystem::connect().inspect_err(|err| eprintln!("{err}"))?;
    smol::block_on(daemon::start(ws))
}
