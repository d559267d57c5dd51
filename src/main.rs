fn main() {
    let exit_code = match lathe::run::run() {
        Ok(code) => code,
        Err(err) => {
            println!("lathe: error: {}", err);
            1
        }
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
