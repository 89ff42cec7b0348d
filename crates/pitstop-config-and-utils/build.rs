fn main() {
    // Default endpoints are baked in with option_env!(); rebuild when they change.
    println!("cargo:rerun-if-env-changed=PITSTOP_API_URL");
    println!("cargo:rerun-if-env-changed=PITSTOP_REALTIME_URL");
}
