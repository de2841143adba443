mod app;
mod compute;
mod config;
mod error;
mod frame;
mod input;
mod rendering;
mod simulation;

fn main() {
    if let Err(e) = app::run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}
