//! Immutable configuration snapshot consumed by sessions and devices.
//!
//! Loading/parsing the configuration file is a collaborator concern
//! (spec.md §1); this module only defines the snapshot shape and the
//! comparison used to decide whether a live reload can be applied
//! in place or needs a phone-side reset (spec.md §4.5, §6.6).
//!
//! Snapshot field set grounded on `xivo-libsccp/sccp_config.h`; the
//! Arc-wrapped-snapshot-swap pattern is grounded on
//! `rvoip-registrar-core`'s `RegistrarConfig` usage in `api/mod.rs`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const DEVICE_NAME_MAX: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceModel {
    Cisco7960,
    Cisco7940,
    Cisco7941,
    Cisco7911,
    Cisco7941Ge,
    Cisco7931,
    Cisco7921,
    Cisco7906,
    Cisco7962,
    Cisco7937,
    Cisco7942,
    Cisco7905,
    Cisco7970,
    Cisco7912,
    Cipc,
    Cisco7961,
}

impl DeviceModel {
    /// Wire `type` values accepted by registration (spec.md §6.4).
    pub fn from_wire(type_id: u32) -> Option<Self> {
        use DeviceModel::*;
        Some(match type_id {
            7 => Cisco7960,
            8 => Cisco7940,
            115 => Cisco7941,
            307 => Cisco7911,
            309 => Cisco7941Ge,
            348 => Cisco7931,
            365 => Cisco7921,
            369 => Cisco7906,
            404 => Cisco7962,
            431 => Cisco7937,
            434 => Cisco7942,
            20000 => Cisco7905,
            30006 => Cisco7970,
            30007 => Cisco7912,
            30016 => Cipc,
            30018 => Cisco7961,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedDialConfig {
    pub name: String,
    pub label: String,
    pub extension: String,
    pub index: u32,
    pub instance: u32,
    pub blf: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    pub name: String,
    pub cid_name: String,
    pub cid_num: String,
    pub context: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub dateformat: String,
    pub voicemail: String,
    pub keepalive: u16,
    pub authtimeout: u64,
    pub line: LineConfig,
    pub speeddials: Vec<SpeedDialConfig>,
    pub codec_preference: Vec<u32>,
}

impl DeviceConfig {
    pub fn speeddial_count(&self) -> usize {
        self.speeddials.len()
    }

    /// Field-by-field comparison used to decide whether a live reload
    /// can be swapped in without disturbing the phone (spec.md §6.6).
    /// Returns `true` if any compared field differs, meaning a
    /// `RESET(soft)` must be sent.
    pub fn differs_for_live_reload(&self, other: &DeviceConfig) -> bool {
        if self.dateformat != other.dateformat
            || self.voicemail != other.voicemail
            || self.keepalive != other.keepalive
            || self.speeddial_count() != other.speeddial_count()
        {
            return true;
        }
        if self.line.name != other.line.name
            || self.line.cid_num != other.line.cid_num
            || self.line.cid_name != other.line.cid_name
            || self.line.context != other.line.context
        {
            return true;
        }
        for (a, b) in self.speeddials.iter().zip(other.speeddials.iter()) {
            if a.label != b.label || a.blf != b.blf || a.extension != b.extension {
                return true;
            }
        }
        false
    }
}

/// A point-in-time, reference-counted view of all configured devices.
/// Swapped atomically under the owning device's lock on reload
/// (spec.md §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub bindaddr: String,
    pub devices: Vec<DeviceConfig>,
}

/// Used to arm the pre-registration auth timer before the connecting
/// device's identity — and thus its own `authtimeout` — is known
/// (spec.md §4.4; `sccp.c:1164` reads the matching global once a
/// device is identified, but a fresh TCP accept has none yet).
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

impl ConfigSnapshot {
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// The timeout armed at accept time, before `REGISTER` names the
    /// device: the smallest `authtimeout` configured across all devices,
    /// so no device can be kept waiting longer than its own setting
    /// allows. Falls back to [`DEFAULT_AUTH_TIMEOUT_SECS`] when no
    /// devices are configured.
    pub fn pending_auth_timeout_secs(&self) -> u64 {
        self.devices.iter().map(|d| d.authtimeout).min().unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS)
    }
}

pub type SharedConfig = Arc<ConfigSnapshot>;
