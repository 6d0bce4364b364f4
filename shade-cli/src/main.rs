mod application;
mod presentation;

use shade_core::error::Result;

fn main() -> Result<()> {
    application::run()
}
