//! Material and time report

use std::collections::BTreeMap;

use crate::calculator::{self, AggregateResult};

/// Names of the production phases, top tier first
const PHASES: &[&str] = &["Building", "Crafting", "Smelting"];

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTime {
    pub name: String,
    pub seconds: f64,
    pub percent: f64,
}

/// Summary of a resolved blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub components: BTreeMap<String, f64>,
    pub ingots: BTreeMap<String, f64>,
    pub ores: BTreeMap<String, f64>,
    pub phases: Vec<PhaseTime>,
    pub total_seconds: f64,
}

/// Reduce resolver output to the three material sections and time ratios
pub fn summarize(result: &AggregateResult) -> Report {
    let total_seconds = result.total_time();

    let phases = result
        .tiers
        .iter()
        .enumerate()
        .map(|(i, tier)| PhaseTime {
            name: PHASES
                .get(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("Tier {}", i)),
            seconds: tier.time_seconds,
            percent: ratio(tier.time_seconds, total_seconds),
        })
        .collect();

    Report {
        components: result
            .tier(1)
            .map(|t| t.demand.clone())
            .unwrap_or_default(),
        ingots: calculator::intermediate_items(result, 2),
        ores: result.raw.clone(),
        phases,
        total_seconds,
    }
}

fn ratio(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (1000.0 * part / total).round() / 10.0
    } else {
        0.0
    }
}

/// Format seconds as `DDD days, HH:MM:SS`, rounding up to whole seconds
pub fn format_time(seconds: f64) -> String {
    let mut seconds = seconds.max(0.0).ceil() as u64;

    let days = seconds / 86400;
    seconds -= days * 86400;
    let hours = seconds / 3600;
    seconds -= hours * 3600;
    let minutes = seconds / 60;
    seconds -= minutes * 60;
    format!("{:>3} days, {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn write_section(
    f: &mut std::fmt::Formatter<'_>,
    title: &str,
    items: &BTreeMap<String, f64>,
) -> std::fmt::Result {
    writeln!(f, "{}", title)?;
    for (name, quantity) in items {
        writeln!(f, "{:30}: {:20.1}", name, quantity)?;
    }
    Ok(())
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_section(f, "Total components required:", &self.components)?;
        writeln!(f)?;
        write_section(f, "Total ingots needed:", &self.ingots)?;
        writeln!(f)?;
        write_section(f, "Total ores needed:", &self.ores)?;
        writeln!(f)?;

        writeln!(f, "Total time needed to build entire blueprint from scratch (ores):")?;
        for phase in &self.phases {
            writeln!(
                f,
                "{}: {} ({:5.1} %)",
                phase.name,
                format_time(phase.seconds),
                phase.percent
            )?;
        }
        writeln!(f, "Total: {}", format_time(self.total_seconds))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::TierTotals;

    fn sample_result() -> AggregateResult {
        AggregateResult {
            tiers: vec![
                TierTotals {
                    demand: BTreeMap::from([("A".to_string(), 1.0)]),
                    time_seconds: 10.0,
                },
                TierTotals {
                    demand: BTreeMap::from([("B".to_string(), 2.0)]),
                    time_seconds: 5.0,
                },
                TierTotals {
                    demand: BTreeMap::from([
                        ("C".to_string(), 3.0),
                        ("Iron Ingot".to_string(), 1.5),
                    ]),
                    time_seconds: 5.0,
                },
                TierTotals {
                    demand: BTreeMap::from([("Iron Ore".to_string(), 2.0)]),
                    time_seconds: 0.0,
                },
            ],
            raw: BTreeMap::from([("C".to_string(), 3.0), ("Iron Ore".to_string(), 2.0)]),
        }
    }

    #[test]
    fn time_is_formatted_in_days_and_rounded_up() {
        assert_eq!(format_time(0.0), "  0 days, 00:00:00");
        assert_eq!(format_time(59.2), "  0 days, 00:01:00");
        assert_eq!(format_time(90061.0), "  1 days, 01:01:01");
    }

    #[test]
    fn sections_split_components_ingots_and_ores() {
        let report = summarize(&sample_result());
        assert_eq!(report.components, BTreeMap::from([("B".to_string(), 2.0)]));
        assert_eq!(report.ingots, BTreeMap::from([("Iron Ingot".to_string(), 1.5)]));
        assert_eq!(report.ores.len(), 2);
    }

    #[test]
    fn phase_ratios() {
        let report = summarize(&sample_result());
        let names: Vec<_> = report.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Building", "Crafting", "Smelting", "Tier 3"]);
        assert_eq!(report.phases[0].percent, 50.0);
        assert_eq!(report.phases[1].percent, 25.0);
        assert_eq!(report.total_seconds, 20.0);
    }

    #[test]
    fn zero_total_time_gives_zero_ratios() {
        let result = AggregateResult {
            tiers: vec![TierTotals::default()],
            raw: BTreeMap::new(),
        };
        let report = summarize(&result);
        assert_eq!(report.phases[0].percent, 0.0);
    }

    #[test]
    fn rendered_report_lists_every_section() {
        let rendered = summarize(&sample_result()).to_string();
        assert!(rendered.contains("Total components required:"));
        assert!(rendered.contains("Total ingots needed:"));
        assert!(rendered.contains("Total ores needed:"));
        assert!(rendered.contains("Building:   0 days, 00:00:10 ( 50.0 %)"));
        assert!(rendered.contains("Total:   0 days, 00:00:20"));
    }
}
