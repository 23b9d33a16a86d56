/// Whether enough monitors are known for bootstrap and provisioning to proceed.
#[must_use]
pub const fn is_ready(member_count: usize, threshold: usize) -> bool {
    member_count >= threshold
}
