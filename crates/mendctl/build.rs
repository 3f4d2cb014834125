// Build script for mendctl - embeds version at compile time

fn main() {
    // Release builds may pin the version through the environment
    let version =
        std::env::var("MEND_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=MEND_VERSION={}", version);
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=MEND_VERSION");
}
