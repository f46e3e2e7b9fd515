mod application;
mod presentation;

use chunkrelay_core::Result;

fn main() -> Result<()> {
    application::run()
}
