// src/utils/otp.rs

use rand::Rng;

/// Generates a 6-digit numeric one-time passcode.
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    code.to_string()
}
