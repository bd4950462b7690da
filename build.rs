extern crate cryptsetup_gen;

use std::env;
use std::path::PathBuf;

use cryptsetup_gen::{Generator, OPERATIONS};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=lib/cryptsetup-gen/src");

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    if let Err(e) = Generator::new(OPERATIONS).write_to(&out_dir) {
        panic!("failed to generate libcryptsetup wrappers: {}", e);
    }
}
