fn main() {
    println!("cargo:rerun-if-env-changed=VOLSETUP_VERSION");
}
