//! Applying coupon codes to a checkout page.
//!
//! The page is modelled as a [`Document`] behind the [`Page`] trait. A
//! [`Prober`] finds the coupon field and its apply control, [`run_attempt`]
//! types and submits one code and judges the page's reaction, and a
//! [`PageSession`] runs batches of attempts one at a time.

pub mod batch;
pub mod dom;
pub mod error;
pub mod executor;
pub mod observe;
pub mod page;
pub mod price;
pub mod prober;
pub mod selector;
pub mod simulate;

pub use batch::{BatchEvent, BatchSummary, PageSession, SessionSettings};
pub use dom::{Document, NodeId};
pub use error::{BatchError, PageError, SelectorError};
pub use executor::{run_attempt, ExecutorSettings, Mode, Outcome, TestError, TestResult};
pub use observe::{MarkerChange, MarkerSnapshot, SettleTiming, Settled};
pub use page::{DomEvent, Page};
pub use price::{parse_amount, read_total};
pub use prober::{find_input, find_submit, validate_store_selectors, Locator, ProbeTarget, Prober};
pub use selector::Selector;
pub use simulate::SimulatedCheckout;
