fn main() -> Result<(), Box<dyn std::error::Error>> {
    causette::cli::main()
}
