use bigdecimal::ToPrimitive;
use std::collections::HashMap;

use crate::config::OutlierConfig;
use crate::corpus::HistoricalCorpus;
use crate::models::{Finding, FindingKind, FindingLocation, LineItem, PriceDeviation, Severity};

/// 单个编码的历史单价分布 (已排序)
#[derive(Debug, Clone)]
pub struct PricePopulation {
    sorted: Vec<f64>,
    pub median: f64,
    pub scaled_mad: f64,
    /// 实际使用的离散度 (MAD 为 0 时取中位数比例下限)
    pub spread: f64,
    clusters: Vec<(f64, f64)>,
    radius: f64,
}

impl PricePopulation {
    /// 样本不足返回 None (静默跳过，不算错误)
    pub fn build(samples: &[f64], config: &OutlierConfig) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|p| p.is_finite()).collect();
        if sorted.len() < config.min_population.max(1) {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let median = median_of_sorted(&sorted);
        let mut deviations: Vec<f64> = sorted.iter().map(|p| (p - median).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        let scaled_mad = median_of_sorted(&deviations) * config.mad_scale;

        let spread = if scaled_mad > 0.0 {
            scaled_mad
        } else {
            (median.abs() * config.zero_spread_ratio).max(f64::EPSILON)
        };

        let radius = spread * config.density_radius;
        let clusters = density_clusters(&sorted, radius, config.density_min_points);

        Some(Self {
            sorted,
            median,
            scaled_mad,
            spread,
            clusters,
            radius,
        })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// 偏离中位数的离散度倍数 (对高价/低价对称)
    pub fn deviation_multiple(&self, price: f64) -> f64 {
        (price - self.median).abs() / self.spread
    }

    /// 是否落在所有簇的邻域之外；没有任何簇时不判定
    pub fn is_density_isolated(&self, price: f64) -> bool {
        !self.clusters.is_empty()
            && self
                .clusters
                .iter()
                .all(|&(lo, hi)| price < lo - self.radius || price > hi + self.radius)
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// 一维 DBSCAN：核心点 = 半径内 (含自身) 至少 min_points 个样本；
/// 相邻核心点间距 ≤ 半径时合并；边界点并入其核心点所在簇。
/// 输入已排序，结果与样本原始顺序无关。返回各簇 [最小值, 最大值]。
fn density_clusters(sorted: &[f64], radius: f64, min_points: usize) -> Vec<(f64, f64)> {
    let n = sorted.len();
    let mut lo = 0usize;
    let mut hi = 0usize;
    let mut core = vec![false; n];
    for (i, &p) in sorted.iter().enumerate() {
        while sorted[lo] < p - radius {
            lo += 1;
        }
        if hi < i {
            hi = i;
        }
        while hi + 1 < n && sorted[hi + 1] <= p + radius {
            hi += 1;
        }
        core[i] = hi - lo + 1 >= min_points.max(1);
    }

    let mut clusters: Vec<(f64, f64)> = Vec::new();
    let mut last_core: Option<f64> = None;
    for (i, &p) in sorted.iter().enumerate() {
        if !core[i] {
            continue;
        }
        match (last_core, clusters.last_mut()) {
            (Some(prev), Some(cluster)) if p - prev <= radius => cluster.1 = p,
            _ => clusters.push((p, p)),
        }
        last_core = Some(p);
    }

    // 边界点：距某簇核心点在半径内
    for cluster in clusters.iter_mut() {
        let (start, end) = *cluster;
        if let Some(&min) = sorted.iter().find(|&&p| p >= start - radius) {
            cluster.0 = min.min(start);
        }
        if let Some(&max) = sorted.iter().rev().find(|&&p| p <= end + radius) {
            cluster.1 = max.max(end);
        }
    }
    clusters
}

/// 单价离群检测
pub struct PriceOutlierDetector<'a> {
    config: &'a OutlierConfig,
}

impl<'a> PriceOutlierDetector<'a> {
    pub fn new(config: &'a OutlierConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, line_items: &[LineItem], corpus: &dyn HistoricalCorpus) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut populations: HashMap<String, Option<PricePopulation>> = HashMap::new();

        for (index, item) in line_items.iter().enumerate() {
            let Some(code) = item.known_code() else {
                continue;
            };

            let population = populations.entry(code.clone()).or_insert_with(|| {
                let samples: Vec<f64> = corpus
                    .price_samples_for_code(&code)
                    .iter()
                    .filter_map(|p| p.to_f64())
                    .collect();
                let built = PricePopulation::build(&samples, self.config);
                if built.is_none() {
                    tracing::debug!("code {}: {} price samples, skip outlier scoring", code, samples.len());
                }
                built
            });
            let Some(population) = population.as_ref() else {
                continue;
            };

            let Some(price) = item.unit_price.to_f64() else {
                continue;
            };
            let multiple = population.deviation_multiple(price);
            if multiple <= self.config.flag_multiple {
                continue;
            }

            let severity = if multiple > self.config.high_multiple {
                Severity::High
            } else {
                Severity::Medium
            };
            let density_isolated = population.is_density_isolated(price);
            let direction = if price > population.median { "above" } else { "below" };

            findings.push(Finding::new(
                FindingKind::PriceOutlier {
                    code: code.clone(),
                    unit_price: item.unit_price.clone(),
                    deviation: PriceDeviation {
                        population: population.len(),
                        median: population.median,
                        scaled_mad: population.scaled_mad,
                        deviation_multiple: multiple,
                        density_isolated,
                    },
                },
                severity,
                FindingLocation::LineItem {
                    index,
                    code: Some(code.clone()),
                },
                format!(
                    "line {}: unit price {} for {} is {:.1}x spread {} the historical median {:.2} (n={}){}",
                    index + 1,
                    item.unit_price,
                    code,
                    multiple,
                    direction,
                    population.median,
                    population.len(),
                    if density_isolated { ", outside all price clusters" } else { "" }
                ),
            ));
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::MemoryCorpus;
    use crate::models::invoice::fixtures::*;

    const BASE: [&str; 7] = ["90", "95", "100", "100", "105", "110", "100"];

    fn corpus_with_prices(code: &str, prices: &[&str]) -> MemoryCorpus {
        let corpus = MemoryCorpus::new();
        for (i, price) in prices.iter().enumerate() {
            let mut record = acme_invoice();
            record.invoice_number = format!("H-{}", i);
            record.line_items = vec![line(code, "0", "1", price, price)];
            corpus.insert(record);
        }
        corpus
    }

    fn samples(prices: &[&str]) -> Vec<f64> {
        prices.iter().map(|p| p.parse::<f64>().unwrap()).collect()
    }

    #[test]
    fn test_median_and_mad() {
        let config = OutlierConfig::default();
        let population = PricePopulation::build(&samples(&BASE), &config).unwrap();
        assert_eq!(population.median, 100.0);
        // |x-100| = 10,5,0,0,5,10,0 -> 中位数 5
        assert!((population.scaled_mad - 5.0 * 1.4826).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_population_is_silent() {
        let config = OutlierConfig::default();
        let corpus = corpus_with_prices("8517", &["100", "100", "100", "100"]);
        let items = vec![line("8517", "0", "1", "10000", "10000")];
        assert!(PriceOutlierDetector::new(&config).detect(&items, &corpus).is_empty());
    }

    #[test]
    fn test_median_price_never_flags() {
        let config = OutlierConfig::default();
        let corpus = corpus_with_prices("8517", &BASE);
        let items = vec![line("8517", "0", "1", "100", "100")];
        assert!(PriceOutlierDetector::new(&config).detect(&items, &corpus).is_empty());
    }

    #[test]
    fn test_monotonic_beyond_five_spreads_is_high() {
        let config = OutlierConfig::default();
        let corpus = corpus_with_prices("8517", &BASE);
        let detector = PriceOutlierDetector::new(&config);
        let threshold = 100.0 + 5.0 * 5.0 * 1.4826;

        for bump in [0.5, 1.0, 10.0, 1000.0] {
            let price = format!("{:.2}", threshold + bump);
            let items = vec![line("8517", "0", "1", &price, &price)];
            let findings = detector.detect(&items, &corpus);
            assert_eq!(findings.len(), 1, "price {}", price);
            assert_eq!(findings[0].severity, Severity::High, "price {}", price);
        }
    }

    #[test]
    fn test_symmetric_medium_band() {
        let config = OutlierConfig::default();
        let corpus = corpus_with_prices("8517", &BASE);
        let detector = PriceOutlierDetector::new(&config);
        // 4 倍离散度：上下两侧都是 medium
        let offset = 4.0 * 5.0 * 1.4826;
        for price in [100.0 + offset, 100.0 - offset] {
            let price = format!("{:.2}", price);
            let items = vec![line("8517", "0", "1", &price, &price)];
            let findings = detector.detect(&items, &corpus);
            assert_eq!(findings.len(), 1, "price {}", price);
            assert_eq!(findings[0].severity, Severity::Medium, "price {}", price);
        }
    }

    #[test]
    fn test_order_independent() {
        let config = OutlierConfig::default();
        let mut reversed = BASE;
        reversed.reverse();
        let a = PricePopulation::build(&samples(&BASE), &config).unwrap();
        let b = PricePopulation::build(&samples(&reversed), &config).unwrap();
        assert_eq!(a.median, b.median);
        assert_eq!(a.scaled_mad, b.scaled_mad);
        assert_eq!(a.clusters, b.clusters);
    }

    #[test]
    fn test_density_isolation_reinforces() {
        let config = OutlierConfig::default();
        let corpus = corpus_with_prices("8517", &BASE);
        let items = vec![line("8517", "0", "1", "500", "500")];
        let findings = PriceOutlierDetector::new(&config).detect(&items, &corpus);
        assert_eq!(findings.len(), 1);
        match &findings[0].kind {
            FindingKind::PriceOutlier { deviation, .. } => assert!(deviation.density_isolated),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_density_clusters_split_on_gap() {
        let sorted = [10.0, 10.5, 11.0, 50.0, 50.5, 51.0, 200.0];
        let clusters = density_clusters(&sorted, 1.0, 3);
        assert_eq!(clusters, vec![(10.0, 11.0), (50.0, 51.0)]);
    }
}
