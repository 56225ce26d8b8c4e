//! Generates the Swift and Kotlin bindings for `agrokit-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
