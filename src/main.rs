fn main() {
    if let Err(e) = basement_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
