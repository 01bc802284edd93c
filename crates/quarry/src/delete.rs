use crate::compile::compile_delete;
use crate::entity::Entity;
use crate::error::Result;
use crate::expr::{Expr, Lambda, Param};
use crate::session::execute;
use crate::table::Table;

impl<T: Entity> Table<T> {
    /// `DELETE` of the rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `filter` is always true (use an explicit
    /// column condition to empty a table), or the provider's error.
    pub fn delete(&self, filter: impl FnOnce(Param) -> Expr) -> Result<u64> {
        let session = self.session.as_ref();
        let query = compile_delete(
            session.dialect(),
            session.evaluator(),
            session.id(),
            &self.name,
            &self.schema,
            &Lambda::of1(filter),
        )?;
        execute(session, &self.shard, &query)
    }
}
