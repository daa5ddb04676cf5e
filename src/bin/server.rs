//! `PitchCraft` server binary.
//! Run with: cargo run --bin pitchcraft-server

use std::process::ExitCode;

use pitchcraft::start_pitchcraft;

fn main() -> ExitCode {
    start_pitchcraft::run()
}
