pub mod bundle;
pub mod pricing;

pub use bundle::{volume_for_bundle, BundleLabel, UnknownBundle, DEFAULT_VOLUME_MB};
pub use pricing::{default_price, PricingTable};
