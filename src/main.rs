fn main() {
    if let Err(err) = climate_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
