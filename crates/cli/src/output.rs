//! Plain console output for command results; diagnostics go through `tracing`.

pub fn info(message: impl AsRef<str>) {
    println!("[storekeep] {}", message.as_ref());
}

pub fn stage(stage: &str, message: impl AsRef<str>) {
    eprintln!("[storekeep::{}] {}", stage, message.as_ref());
}

pub fn detail(message: impl AsRef<str>) {
    println!("    {}", message.as_ref());
}
