pub mod accessor;
pub mod calendar;
pub mod loader;
pub mod types;

pub use accessor::{HistoricalDataAccessor, InMemoryAccessor};
pub use calendar::{add_business_days, business_days_between, is_business_day, sub_business_days};
pub use loader::{FileAccessor, EXPECTED_COLUMNS};
pub use types::{to_f64, PriceBar, PriceSeries};
