use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();

    let args = mf_export::args::parse();
    mf_export::cli::main(args)
}
