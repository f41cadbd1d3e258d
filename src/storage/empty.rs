//! A store that knows nothing. Useful as a mixer placeholder and as the
//! smallest complete [`Store`] implementation.

use async_trait::async_trait;

use crate::model::{Descriptor, DescriptorMask, Entity, Filter, Statement};
use crate::Result;

use super::policy::SharedOptions;
use super::stream::{AnnotationStream, StatementStream};
use super::{validate_language, validate_statements, Store, StoreOptions};

#[derive(Debug)]
pub struct EmptyStore {
    options: SharedOptions,
}

impl EmptyStore {
    pub fn new(options: StoreOptions) -> Result<Self> {
        Ok(Self { options: SharedOptions::new(options)? })
    }
}

impl Default for EmptyStore {
    fn default() -> Self {
        Self { options: SharedOptions::from_valid(StoreOptions::default()) }
    }
}

#[async_trait]
impl Store for EmptyStore {
    fn name(&self) -> &str {
        "empty"
    }

    fn options(&self) -> StoreOptions {
        self.options.snapshot()
    }

    fn update_options(&self, f: &mut dyn FnMut(&mut StoreOptions)) {
        self.options.update(f);
    }

    fn filter(&self, filter: &Filter, _limit: Option<usize>, page_size: Option<usize>) -> Result<StatementStream> {
        filter.validate()?;
        if page_size == Some(0) {
            return Err(crate::Error::Argument("page_size must be positive".into()));
        }
        Ok(StatementStream::empty())
    }

    fn filter_all(&self, filter: &Filter, page_size: Option<usize>) -> Result<StatementStream> {
        self.filter(filter, None, page_size)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        filter.validate()?;
        Ok(0)
    }

    async fn contains(&self, statement: &Statement) -> Result<bool> {
        validate_statements(std::slice::from_ref(statement))?;
        Ok(false)
    }

    fn get_annotations(&self, statements: Vec<Statement>) -> Result<AnnotationStream> {
        validate_statements(&statements)?;
        Ok(AnnotationStream::unknown(statements))
    }

    async fn get_descriptors(
        &self,
        entities: &[Entity],
        language: &str,
        _mask: DescriptorMask,
    ) -> Result<Vec<(Entity, Option<Descriptor>)>> {
        validate_language(language)?;
        Ok(entities.iter().map(|e| (e.clone(), None)).collect())
    }
}
