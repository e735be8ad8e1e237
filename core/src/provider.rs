//! Capability sets implemented by table providers and their cursors.

use crate::args::Arguments;
use crate::error::Result;
use crate::plan::{ChosenPlan, PlanBuilder, PlanOutcome, PlanRequest};
use crate::value::Value;

/// Flags a provider asks the engine to apply to its tables.
///
/// # Examples
///
/// ```
/// use tablebridge_core::ProviderOptions;
///
/// let options = ProviderOptions::default().innocuous();
/// assert!(options.innocuous);
/// assert!(!options.direct_only);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    /// The provider checks constraints itself and can abort statements on a
    /// constraint violation.
    pub constraint_support: bool,
    /// The table is safe to use from triggers, views and schema structures
    /// even when untrusted schema is disabled.
    pub innocuous: bool,
    /// The table may only be used from top-level SQL, never from triggers
    /// or views.
    pub direct_only: bool,
}

impl ProviderOptions {
    pub fn constraint_support(mut self) -> Self {
        self.constraint_support = true;
        self
    }

    pub fn innocuous(mut self) -> Self {
        self.innocuous = true;
        self
    }

    pub fn direct_only(mut self) -> Self {
        self.direct_only = true;
        self
    }
}

/// Backs one virtual table.
///
/// A provider is built once per table per connection by [`construct`],
/// negotiates query plans with [`plan`] and opens any number of
/// independent cursors with [`open`]. When a creatable table is dropped the
/// bridge calls [`destroy`] before releasing the provider, giving it a
/// chance to clean up persistent state.
///
/// [`construct`]: Provider::construct
/// [`plan`]: Provider::plan
/// [`open`]: Provider::open
/// [`destroy`]: Provider::destroy
///
/// # Threading
///
/// Providers and cursors live inside the engine connection, which may be
/// moved to another thread, so both must be [`Send`]. They never need to be
/// [`Sync`]: the engine serializes every call on one connection.
///
/// ```compile_fail
/// use std::rc::Rc;
/// use tablebridge_core::*;
///
/// struct Shared(Rc<Vec<i64>>);
/// struct SharedCursor;
///
/// impl Provider for Shared {
///     type Cursor = SharedCursor;
///     fn construct(_args: &Arguments) -> Result<Self> {
///         Ok(Shared(Rc::new(Vec::new())))
///     }
///     fn schema(&self) -> String {
///         "CREATE TABLE x(n INTEGER)".to_string()
///     }
///     fn open(&self) -> Result<SharedCursor> {
///         Ok(SharedCursor)
///     }
/// }
///
/// impl Cursor for SharedCursor {
///     fn filter(&mut self, _: &[Value], _: &ChosenPlan<'_>) -> Result<()> { Ok(()) }
///     fn advance(&mut self) -> Result<()> { Ok(()) }
///     fn at_end(&self) -> bool { true }
///     fn column(&self, _: usize) -> Result<Value> { Ok(Value::Null) }
///     fn row_identity(&self) -> Result<i64> { Ok(0) }
/// }
/// ```
///
/// # Examples
///
/// ```
/// use tablebridge_core::*;
///
/// struct Digits;
///
/// struct DigitCursor {
///     next: i64,
/// }
///
/// impl Provider for Digits {
///     type Cursor = DigitCursor;
///
///     fn construct(_args: &Arguments) -> Result<Self> {
///         Ok(Digits)
///     }
///
///     fn schema(&self) -> String {
///         "CREATE TABLE x(d INTEGER)".to_string()
///     }
///
///     fn open(&self) -> Result<DigitCursor> {
///         Ok(DigitCursor { next: 10 })
///     }
/// }
///
/// impl Cursor for DigitCursor {
///     fn filter(&mut self, _args: &[Value], _plan: &ChosenPlan<'_>) -> Result<()> {
///         self.next = 0;
///         Ok(())
///     }
///
///     fn advance(&mut self) -> Result<()> {
///         self.next += 1;
///         Ok(())
///     }
///
///     fn at_end(&self) -> bool {
///         self.next >= 10
///     }
///
///     fn column(&self, _index: usize) -> Result<Value> {
///         Ok(Value::Integer(self.next))
///     }
///
///     fn row_identity(&self) -> Result<i64> {
///         Ok(self.next)
///     }
/// }
///
/// let provider = Digits::construct(&Arguments::new(
///     ConnectMode::Connect, "digits", "main", "digits", vec![],
/// ))
/// .unwrap();
/// let mut cursor = provider.open().unwrap();
/// cursor.filter(&[], &ChosenPlan::new(PlanId::FULL_SCAN, None)).unwrap();
/// let mut seen = Vec::new();
/// while !cursor.at_end() {
///     seen.push(cursor.column(0).unwrap().as_i64().unwrap());
///     cursor.advance().unwrap();
/// }
/// assert_eq!(seen, (0..10).collect::<Vec<_>>());
/// ```
pub trait Provider: Sized + Send + 'static {
    /// Cursor type produced by [`Provider::open`].
    type Cursor: Cursor + Send + 'static;

    /// Builds the provider from its constructor arguments.
    ///
    /// # Errors
    ///
    /// Returns an error, usually [`BridgeError::Construction`], when the
    /// arguments are malformed. Nothing is registered with the engine in
    /// that case.
    ///
    /// [`BridgeError::Construction`]: crate::BridgeError::Construction
    fn construct(args: &Arguments) -> Result<Self>;

    /// A `CREATE TABLE` statement describing the exposed columns. The table
    /// name in the statement is ignored.
    fn schema(&self) -> String;

    /// Flags applied to the table once its schema is declared.
    fn options(&self) -> ProviderOptions {
        ProviderOptions::default()
    }

    /// Negotiates a query plan. The default accepts no constraints and
    /// answers with a full scan.
    fn plan(&self, request: &PlanRequest) -> Result<PlanOutcome> {
        Ok(PlanBuilder::new(request).finish())
    }

    /// Opens a new cursor, independent of any other open cursor.
    fn open(&self) -> Result<Self::Cursor>;

    /// Called when the table is dropped, before the provider is released.
    /// Failure keeps the table in the schema.
    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Iterates the rows of one scan.
///
/// The bridge drives a cursor through `filter`, then alternates `at_end`,
/// `column`/`row_identity` and `advance`. `filter` may be called again on
/// the same cursor to restart the scan with new arguments.
pub trait Cursor {
    /// Starts a scan. `args` holds the values of the accepted constraints in
    /// argument order.
    fn filter(&mut self, args: &[Value], plan: &ChosenPlan<'_>) -> Result<()>;

    /// Moves to the next row.
    fn advance(&mut self) -> Result<()>;

    /// `true` once the cursor has moved past the last row.
    fn at_end(&self) -> bool;

    /// Reads column `index` of the current row.
    fn column(&self, index: usize) -> Result<Value>;

    /// Returns the 64-bit row identity of the current row.
    fn row_identity(&self) -> Result<i64>;
}
