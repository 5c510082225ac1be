//! Reference-counted power control of the OIS rail.
//!
//! Only the 0 -> 1 edge runs the physical power-up sequence (followed by the mandatory settle
//! delay) and only the 1 -> 0 edge runs physical power-down. Every other call just moves the
//! count. A failed physical transition leaves the count where it was.

use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use super::servo::ServoMode;
use super::OisDevice;
use crate::error::{OisError, OisResult};
use crate::hardware::PowerRail;

/// Wait after physical power-up: 100 ms for the coprocessor plus 30 ms for the bus.
pub const POWER_SETTLE: Duration = Duration::from_millis(130);

/// What a power call did to the rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTransition {
    /// The rail was physically switched
    Physical,
    /// Only the reference count moved
    CountOnly,
    /// Nothing changed (power-down with a zero count)
    Ignored,
}

/// Power reference count.
#[derive(Debug, Default)]
pub struct PowerSequencer {
    refcount: u32,
}

impl PowerSequencer {
    /// Count of zero, rail down.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reference count.
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Whether at least one reference holds the rail up.
    pub fn is_up(&self) -> bool {
        self.refcount > 0
    }

    /// Take a reference, powering the rail on the first one.
    pub fn acquire(&mut self, rail: &mut dyn PowerRail) -> OisResult<PowerTransition> {
        let next = self
            .refcount
            .checked_add(1)
            .ok_or_else(|| OisError::invalid("power reference count overflow"))?;

        if self.refcount > 0 {
            self.refcount = next;
            warn!(count = self.refcount, "count is not 1, power up not called");
            return Ok(PowerTransition::CountOnly);
        }

        rail.power_up()?;
        thread::sleep(POWER_SETTLE);
        self.refcount = next;
        info!("OIS POWER UP");
        Ok(PowerTransition::Physical)
    }

    /// Drop a reference, powering the rail down on the last one.
    pub fn release(&mut self, rail: &mut dyn PowerRail) -> OisResult<PowerTransition> {
        match self.refcount {
            0 => {
                warn!("OIS not powered up, nothing to power down");
                Ok(PowerTransition::Ignored)
            }
            1 => {
                rail.power_down()?;
                self.refcount = 0;
                info!("OIS POWER DOWN");
                Ok(PowerTransition::Physical)
            }
            _ => {
                self.refcount -= 1;
                warn!(count = self.refcount, "count is not 0, power down not called");
                Ok(PowerTransition::CountOnly)
            }
        }
    }
}

impl OisDevice {
    /// Take a power reference. The first reference powers the rail and waits [`POWER_SETTLE`].
    ///
    /// Rejected with [`OisError::InUse`] while a higher-level owner holds the device.
    pub fn power_up(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = if dev.external_owner {
            Err(OisError::InUse("camera".into()))
        } else {
            let dev = &mut *dev;
            dev.power.acquire(dev.power_rail.as_mut()).map(|_| ())
        };
        dev.finish("power_up", result)
    }

    /// Drop a power reference. The last reference powers the rail down and forgets the mode.
    ///
    /// Rejected with [`OisError::InUse`] while a higher-level owner holds the device.
    pub fn power_down(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = if dev.external_owner {
            Err(OisError::InUse("camera".into()))
        } else {
            let dev = &mut *dev;
            dev.power
                .release(dev.power_rail.as_mut())
                .map(|transition| {
                    if transition == PowerTransition::Physical {
                        dev.mode = ServoMode::Uninitialized;
                    }
                })
        };
        dev.finish("power_down", result)
    }

    /// Current power reference count.
    pub fn power_refcount(&self) -> u32 {
        self.lock().power.refcount()
    }

    /// Whether the rail is up, either through our references or a higher-level owner.
    pub fn is_powered(&self) -> bool {
        self.lock().is_powered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::SimulatedPowerRail;

    #[test]
    fn test_physical_switch_only_on_edges() {
        let rail = SimulatedPowerRail::new();
        let mut handle = rail.clone();
        let mut seq = PowerSequencer::new();

        assert_eq!(seq.acquire(&mut handle).unwrap(), PowerTransition::Physical);
        assert_eq!(seq.acquire(&mut handle).unwrap(), PowerTransition::CountOnly);
        assert_eq!(seq.release(&mut handle).unwrap(), PowerTransition::CountOnly);
        assert_eq!(seq.release(&mut handle).unwrap(), PowerTransition::Physical);
        assert_eq!(seq.release(&mut handle).unwrap(), PowerTransition::Ignored);

        assert_eq!(rail.power_up_calls(), 1);
        assert_eq!(rail.power_down_calls(), 1);
        assert_eq!(seq.refcount(), 0);
    }

    #[test]
    fn test_failed_power_up_keeps_count() {
        let rail = SimulatedPowerRail::new();
        rail.fail_power_up(true);
        let mut handle = rail.clone();
        let mut seq = PowerSequencer::new();

        assert!(seq.acquire(&mut handle).is_err());
        assert_eq!(seq.refcount(), 0);
        assert!(!seq.is_up());
    }

    #[test]
    fn test_failed_power_down_keeps_count() {
        let rail = SimulatedPowerRail::new();
        let mut handle = rail.clone();
        let mut seq = PowerSequencer::new();
        seq.acquire(&mut handle).unwrap();

        rail.fail_power_down(true);
        assert!(seq.release(&mut handle).is_err());
        assert_eq!(seq.refcount(), 1);
    }
}
