fn main() -> Result<(), Box<dyn std::error::Error>> {
    toolchat::cli::main()
}
