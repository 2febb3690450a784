fn main() {
  if let Err(err) = mcadminpanel_cli::run() {
    mcadminpanel_cli::report(&err);
    std::process::exit(1);
  }
}
