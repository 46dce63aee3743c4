//! Static margin benchmarks by customer segment and product mix.
//!
//! This is the lookup a brand-new customer gets before any model exists,
//! and the source of the inter-quartile ranges that size the training
//! pipeline's synthetic margin shifts. Every (segment, category) pair is
//! matched exhaustively so adding a variant is a compile error until the
//! table covers it.

use crate::domain::deal::{CustomerSegment, DealContext, DealProductCategory};
use crate::domain::margin::FractionMargin;

/// Fallback band width when a benchmark is unusable.
pub const DEFAULT_IQR: f64 = 0.10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarginBenchmark {
    pub low: FractionMargin,
    pub typical: FractionMargin,
    pub high: FractionMargin,
}

impl MarginBenchmark {
    const fn new(low: f64, typical: f64, high: f64) -> Self {
        Self {
            low: FractionMargin(low),
            typical: FractionMargin(typical),
            high: FractionMargin(high),
        }
    }

    /// Band width; falls back to [`DEFAULT_IQR`] if the band is inverted
    /// or degenerate.
    pub fn iqr(&self) -> f64 {
        let width = self.high.value() - self.low.value();
        if width > 0.0 {
            width
        } else {
            DEFAULT_IQR
        }
    }
}

pub fn benchmark(segment: CustomerSegment, category: DealProductCategory) -> MarginBenchmark {
    use CustomerSegment::*;
    use DealProductCategory::*;

    match (segment, category) {
        (Smb, Hardware) => MarginBenchmark::new(0.08, 0.14, 0.20),
        (MidMarket, Hardware) => MarginBenchmark::new(0.06, 0.12, 0.18),
        (Enterprise, Hardware) => MarginBenchmark::new(0.05, 0.10, 0.15),
        (Smb, Software) => MarginBenchmark::new(0.12, 0.20, 0.30),
        (MidMarket, Software) => MarginBenchmark::new(0.10, 0.18, 0.26),
        (Enterprise, Software) => MarginBenchmark::new(0.08, 0.15, 0.22),
        (Smb, Cloud) => MarginBenchmark::new(0.10, 0.16, 0.24),
        (MidMarket, Cloud) => MarginBenchmark::new(0.08, 0.14, 0.20),
        (Enterprise, Cloud) => MarginBenchmark::new(0.06, 0.12, 0.18),
        (Smb, Services) => MarginBenchmark::new(0.18, 0.28, 0.38),
        (MidMarket, Services) => MarginBenchmark::new(0.15, 0.25, 0.35),
        (Enterprise, Services) => MarginBenchmark::new(0.12, 0.20, 0.30),
        (Smb, Hybrid) => MarginBenchmark::new(0.10, 0.17, 0.26),
        (MidMarket, Hybrid) => MarginBenchmark::new(0.09, 0.15, 0.23),
        (Enterprise, Hybrid) => MarginBenchmark::new(0.07, 0.13, 0.20),
    }
}

/// Band for a concrete deal.
pub fn benchmark_for_deal(deal: &DealContext) -> MarginBenchmark {
    benchmark(deal.segment, deal.product_category)
}

#[cfg(test)]
mod tests {
    use super::{benchmark, MarginBenchmark, DEFAULT_IQR};
    use crate::domain::deal::{CustomerSegment, DealProductCategory};

    #[test]
    fn bands_are_ordered_for_every_pair() {
        for segment in
            [CustomerSegment::Smb, CustomerSegment::MidMarket, CustomerSegment::Enterprise]
        {
            for category in [
                DealProductCategory::Hardware,
                DealProductCategory::Software,
                DealProductCategory::Cloud,
                DealProductCategory::Services,
                DealProductCategory::Hybrid,
            ] {
                let band = benchmark(segment, category);
                assert!(band.low < band.typical && band.typical < band.high);
                assert!(band.iqr() > 0.0);
            }
        }
    }

    #[test]
    fn enterprise_margins_compress_relative_to_smb() {
        for category in [
            DealProductCategory::Hardware,
            DealProductCategory::Software,
            DealProductCategory::Services,
        ] {
            let smb = benchmark(CustomerSegment::Smb, category);
            let enterprise = benchmark(CustomerSegment::Enterprise, category);
            assert!(enterprise.typical < smb.typical);
        }
    }

    #[test]
    fn degenerate_band_falls_back_to_default_iqr() {
        let band = MarginBenchmark::new(0.2, 0.2, 0.2);
        assert_eq!(band.iqr(), DEFAULT_IQR);
    }
}
