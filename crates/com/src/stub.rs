use std::time::Duration;

use anyhow::bail;

use crate::PumpStatus;

/// Stand-in for platforms without OLE. Construction always fails.
pub struct OleApartment;

impl OleApartment {
    pub fn new() -> anyhow::Result<Self> {
        bail!("ActiveX hosting is only supported on Windows")
    }

    pub fn pump(&self, _timeout: Duration) -> PumpStatus {
        PumpStatus::Quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apartment_is_unavailable() {
        let err = OleApartment::new().err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("ActiveX hosting is only supported on Windows")
        );
    }
}
