//! Runner platforms and their billing multipliers
//!
//! GitHub bills hosted runner minutes with a per-OS weight
//! (<https://docs.github.com/en/billing/managing-billing-for-github-actions/about-billing-for-github-actions>).

use std::sync::Arc;

use super::descriptor::{Measurement, MetricDescriptor};
use crate::error::Result;

/// Milliseconds per minute, for converting workflow timings
pub const MS_PER_MINUTE: f64 = 60_000.0;

/// Hosted runner platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Linux, Platform::MacOs, Platform::Windows];

    /// Value of the `platform` label
    pub fn label(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Platform::Linux => 1.0,
            Platform::MacOs => 10.0,
            Platform::Windows => 2.0,
        }
    }

    /// Billed minutes to minutes actually spent on the runner
    pub fn real_minutes(self, billed: f64) -> f64 {
        billed / self.multiplier()
    }

    /// Minutes spent on the runner to billed minutes
    pub fn billed_minutes(self, real: f64) -> f64 {
        real * self.multiplier()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Convert a billable duration to minutes
pub fn ms_to_minutes(ms: u64) -> f64 {
    ms as f64 / MS_PER_MINUTE
}

/// One value per platform
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlatformValues {
    pub linux: f64,
    pub macos: f64,
    pub windows: f64,
}

impl PlatformValues {
    pub fn get(&self, platform: Platform) -> f64 {
        match platform {
            Platform::Linux => self.linux,
            Platform::MacOs => self.macos,
            Platform::Windows => self.windows,
        }
    }

    pub fn map(&self, f: impl Fn(Platform, f64) -> f64) -> Self {
        Self {
            linux: f(Platform::Linux, self.linux),
            macos: f(Platform::MacOs, self.macos),
            windows: f(Platform::Windows, self.windows),
        }
    }

    /// One measurement per platform; `platform` is appended as the last label.
    pub fn measurements(
        &self,
        descriptor: &Arc<MetricDescriptor>,
        label_values: &[&str],
    ) -> Result<Vec<Measurement>> {
        Platform::ALL
            .iter()
            .map(|&platform| {
                let mut labels = label_values.to_vec();
                labels.push(platform.label());
                descriptor.measure(self.get(platform), &labels)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_multipliers() {
        assert_eq!(Platform::Linux.multiplier(), 1.0);
        assert_eq!(Platform::MacOs.multiplier(), 10.0);
        assert_eq!(Platform::Windows.multiplier(), 2.0);
    }

    #[test]
    fn test_labels() {
        let labels: Vec<_> = Platform::ALL.iter().map(|p| p.to_string()).collect();
        assert_eq!(labels, vec!["linux", "macos", "windows"]);
    }

    #[test]
    fn test_real_minutes() {
        assert_eq!(Platform::Linux.real_minutes(100.0), 100.0);
        assert_eq!(Platform::MacOs.real_minutes(100.0), 10.0);
        assert_eq!(Platform::Windows.real_minutes(100.0), 50.0);
    }

    #[test]
    fn test_ms_to_minutes() {
        assert_eq!(ms_to_minutes(90_000), 1.5);
        assert_eq!(ms_to_minutes(120_000), 2.0);
        assert_eq!(ms_to_minutes(0), 0.0);
    }

    #[test]
    fn test_platform_measurements_append_platform_label() {
        let desc = MetricDescriptor::counter(
            "actions_org",
            "minutes_billed_count",
            "help",
            &["org", "platform"],
        );
        let values = PlatformValues {
            linux: 1.0,
            macos: 2.0,
            windows: 3.0,
        };

        let measurements = values.measurements(&desc, &["acme"]).unwrap();

        assert_eq!(measurements.len(), 3);
        for (m, platform) in measurements.iter().zip(Platform::ALL) {
            assert_eq!(m.label("org"), Some("acme"));
            assert_eq!(m.label("platform"), Some(platform.label()));
            assert_eq!(m.value(), values.get(platform));
        }
    }

    #[test]
    fn test_platform_measurements_reject_wrong_arity() {
        let desc = MetricDescriptor::counter("actions_org", "minutes_billed_count", "help", &["org"]);
        assert!(PlatformValues::default().measurements(&desc, &["acme"]).is_err());
    }

    proptest! {
        #[test]
        fn prop_multiplier_round_trip(billed in 0.0f64..1.0e9) {
            for platform in Platform::ALL {
                let real = platform.real_minutes(billed);
                let back = platform.billed_minutes(real);
                prop_assert!((back - billed).abs() <= 1e-9 * billed.max(1.0));
            }
        }

        #[test]
        fn prop_map_preserves_platforms(linux in 0.0f64..1e6, macos in 0.0f64..1e6, windows in 0.0f64..1e6) {
            let values = PlatformValues { linux, macos, windows };
            let real = values.map(|p, v| p.real_minutes(v));
            prop_assert_eq!(real.linux, linux);
            prop_assert_eq!(real.macos, macos / 10.0);
            prop_assert_eq!(real.windows, windows / 2.0);
        }
    }
}
