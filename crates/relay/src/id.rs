use uuid::Uuid;

/// Correlation id: current Unix milliseconds followed by a random fraction,
/// e.g. `17296543210000.7318453921764083`.
///
/// Unique with high probability within one process's in-flight set, which is
/// all it has to be; ids are never persisted.
pub fn next_call_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}{}", millis, random_fraction())
}

/// Uniform in [0, 1) from the 48 leading random bits of a v4 uuid.
fn random_fraction() -> f64 {
    let bits = (Uuid::new_v4().as_u128() >> 80) as u64;
    bits as f64 / (1u64 << 48) as f64
}
