fn main() -> std::process::ExitCode {
    docqa_lib::run()
}
