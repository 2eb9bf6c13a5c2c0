use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=web/");

    if !Path::new("web").join("index.html").exists() {
        panic!("web/index.html is missing; the dashboard is embedded at compile time");
    }
}
