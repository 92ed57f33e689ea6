fn main() {
    cookie_sync::cli::run();
}
