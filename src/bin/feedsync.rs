use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    feedsync::cli::run(std::env::args().skip(1))
}
