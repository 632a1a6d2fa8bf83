use crate::error::PacedError;

pub fn get_exit_code(error: &PacedError) -> i32 {
    match error {
        PacedError::InvalidConfig(_)
        | PacedError::ConfigFile(_)
        | PacedError::InvalidCooldown(_) => 2,

        PacedError::CacheNotOpen(_) | PacedError::CacheInconsistent(_) => 3,

        PacedError::ProbeViolation(_) => 4,

        PacedError::CacheSource(_) => 20,

        _ => 1,
    }
}
