//! Runtime speed-dial state: the static config plus whatever BLF
//! subscription/hint state has been observed (spec.md §3).

use crate::config::SpeedDialConfig;
use crate::host::BlfState;

#[derive(Debug, Clone)]
pub struct SpeedDial {
    pub config: SpeedDialConfig,
    /// Button slot on the phone; assigned after line instances
    /// (spec.md §3 invariant).
    pub instance: u32,
    pub subscription_id: Option<u64>,
    pub last_state: BlfState,
}

impl SpeedDial {
    pub fn from_config(config: SpeedDialConfig, instance: u32) -> Self {
        Self { config, instance, subscription_id: None, last_state: BlfState::Unknown }
    }
}

/// Assigns button-slot instances starting immediately after the
/// device's line instances (spec.md §3 invariant: "speed-dial
/// `instance`s begin immediately after line instances").
pub fn assign_instances(configs: Vec<SpeedDialConfig>, line_instance_count: u32) -> Vec<SpeedDial> {
    configs
        .into_iter()
        .enumerate()
        .map(|(i, cfg)| SpeedDial::from_config(cfg, line_instance_count + 1 + i as u32))
        .collect()
}
