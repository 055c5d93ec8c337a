fn main() {
    if let Err(e) = difflabel::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
