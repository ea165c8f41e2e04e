use crate::{DType, Result, SluiceError};
use slotmap::SlotMap;

//All slotmap keys are COPY
slotmap::new_key_type! {
    /// Non-owning reference from a view to its base.
    ///
    /// A released base's id stops resolving, so a stale view cannot keep
    /// backend storage alive.
    pub struct BaseId;
}

/// An independently allocated, backend-resident buffer.
#[derive(Debug, Clone, derive_new::new)]
pub struct Base<H> {
    len: usize,
    dt: DType,
    handle: H,
    #[new(default)]
    exported: bool,
}

impl<H: Copy> Base<H> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dt(&self) -> DType {
        self.dt
    }

    pub fn handle(&self) -> H {
        self.handle
    }

    pub fn num_bytes(&self) -> usize {
        self.len * self.dt.size_of()
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub(crate) fn mark_exported(&mut self) {
        self.exported = true;
    }
}

/// Owner of every live [`Base`] of a runtime.
#[derive(Debug)]
pub struct BaseRegistry<H> {
    bases: SlotMap<BaseId, Base<H>>,
}

impl<H> Default for BaseRegistry<H> {
    fn default() -> Self {
        Self {
            bases: SlotMap::with_key(),
        }
    }
}

impl<H: Copy> BaseRegistry<H> {
    pub fn insert(&mut self, base: Base<H>) -> BaseId {
        self.bases.insert(base)
    }

    /// Looks up a base that is still owned by the runtime.
    pub fn get(&self, id: BaseId) -> Result<&Base<H>> {
        let base = self.bases.get(id).ok_or(SluiceError::UnknownBase(id))?;
        if base.is_exported() {
            return Err(SluiceError::Exported(id));
        }
        Ok(base)
    }

    pub fn get_mut(&mut self, id: BaseId) -> Result<&mut Base<H>> {
        self.bases.get_mut(id).ok_or(SluiceError::UnknownBase(id))
    }

    pub fn remove(&mut self, id: BaseId) -> Result<Base<H>> {
        self.bases.remove(id).ok_or(SluiceError::UnknownBase(id))
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (BaseId, Base<H>)> + '_ {
        self.bases.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_ids_stop_resolving() {
        let mut registry = BaseRegistry::default();
        let a = registry.insert(Base::new(4, DType::F32, 1u32));
        let b = registry.insert(Base::new(8, DType::I64, 2u32));
        assert_eq!(registry.remove(a).unwrap().handle(), 1);
        assert!(matches!(registry.get(a), Err(SluiceError::UnknownBase(_))));
        assert_eq!(registry.get(b).unwrap().num_bytes(), 64);
    }

    #[test]
    fn exported_bases_are_not_usable() {
        let mut registry = BaseRegistry::default();
        let a = registry.insert(Base::new(4, DType::F32, 1u32));
        registry.get_mut(a).unwrap().mark_exported();
        assert!(matches!(registry.get(a), Err(SluiceError::Exported(_))));
    }
}
