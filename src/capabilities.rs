use crate::error::{NadError, Result};
use crate::types::{SlotId, VolumeRange, Zone};
use std::collections::BTreeMap;

/// Highest source slot the device can report
pub const MAX_SOURCE_SLOTS: SlotId = 19;

/// Value of `source{n}_enabled` for an enabled slot
const ENABLED_TOKEN: &str = "Yes";

/// Per-device configuration read once from the bulk status table
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    /// Every reported slot; disabled slots map to `None`
    sources: BTreeMap<SlotId, Option<String>>,
    source_ids: BTreeMap<String, SlotId>,
    volume_ranges: BTreeMap<Zone, VolumeRange>,
    has_zone2: bool,
}

impl DeviceCapabilities {
    /// Build capabilities from a status table and the secondary-zone probe result
    pub fn from_table(table: BTreeMap<String, String>, has_zone2: bool) -> Result<Self> {
        if table.is_empty() {
            return Err(NadError::NoData);
        }

        let mut sources = BTreeMap::new();
        let mut source_ids = BTreeMap::new();
        for slot in 1..=MAX_SOURCE_SLOTS {
            let Some(enabled) = table.get(&format!("source{}_enabled", slot)) else {
                continue;
            };
            if !enabled.trim().eq_ignore_ascii_case(ENABLED_TOKEN) {
                sources.insert(slot, None);
                continue;
            }
            let name_key = format!("source{}_name", slot);
            let name = table
                .get(&name_key)
                .map(|name| name.trim().to_string())
                .ok_or(NadError::MissingKey(name_key))?;
            source_ids.entry(name.clone()).or_insert(slot);
            sources.insert(slot, Some(name));
        }

        let volume_ranges = Zone::ALL
            .into_iter()
            .map(|zone| (zone, read_volume_range(&table, zone)))
            .collect();

        let caps = Self {
            sources,
            source_ids,
            volume_ranges,
            has_zone2,
        };
        tracing::debug!("Sources discovered: {}", caps.sources().join(","));
        Ok(caps)
    }

    /// Enabled source names in ascending slot order
    pub fn sources(&self) -> Vec<String> {
        self.sources.values().flatten().cloned().collect()
    }

    /// All reported slots, including disabled ones
    pub fn source_slots(&self) -> &BTreeMap<SlotId, Option<String>> {
        &self.sources
    }

    /// Name of an enabled slot
    pub fn source_name(&self, slot: SlotId) -> Option<&str> {
        self.sources.get(&slot).and_then(|name| name.as_deref())
    }

    /// Slot of an enabled source name
    pub fn source_slot(&self, name: &str) -> Option<SlotId> {
        self.source_ids.get(name.trim()).copied()
    }

    /// Volume range of `zone`, or the default when not reported
    pub fn volume_range(&self, zone: Zone) -> VolumeRange {
        self.volume_ranges.get(&zone).copied().unwrap_or_default()
    }

    /// Whether the secondary zone answered the probe
    pub fn has_zone2(&self) -> bool {
        self.has_zone2
    }

    /// Zones present on this device, primary first
    pub fn zones(&self) -> Vec<Zone> {
        if self.has_zone2 {
            vec![Zone::Main, Zone::Zone2]
        } else {
            vec![Zone::Main]
        }
    }
}

fn read_volume_range(table: &BTreeMap<String, String>, zone: Zone) -> VolumeRange {
    let bound = |suffix: &str| {
        table
            .get(&format!("{}_volume_{}", zone.key_prefix(), suffix))
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    match (bound("min"), bound("max")) {
        (Some(min), Some(max)) => VolumeRange::new(min, max).unwrap_or_else(|| {
            tracing::warn!("Ignoring invalid {} volume range {}..{}", zone, min, max);
            VolumeRange::default()
        }),
        _ => {
            tracing::debug!("No volume range reported for {}, using default", zone);
            VolumeRange::default()
        }
    }
}
