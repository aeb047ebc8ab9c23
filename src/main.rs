fn main() -> Result<(), Box<dyn std::error::Error>> {
    calango::cli::main()
}
