extern crate pkg_config;

fn main() {
    let lib = pkg_config::Config::new()
        .atleast_version("2.0.0")
        .probe("libcryptsetup")
        .unwrap();

    // crypt_benchmark_pbkdf and the LUKS2 parameter structs need 2.x
    if !lib.version.as_str().starts_with("2.") {
        println!("cargo:warning=untested libcryptsetup version {}", lib.version);
    }
}
