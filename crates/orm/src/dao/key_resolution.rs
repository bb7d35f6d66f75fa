//! Key derivation and reconstruction
//!
//! Derivation walks a bean's declared key components in order. Scalars are
//! rendered as text; a reference component recurses into the referenced
//! bean through the registry and embeds the nested key's formatted string.
//! Any absent component leaves the whole key undefined.
//!
//! Reconstruction is the inverse, used when only a key is known. Both
//! directions track the chain of bean types being resolved and fail on a
//! repeated type (a cyclic key graph) or once the chain exceeds
//! `MappingConfig::max_key_depth`.

use tracing::{debug, warn};

use crate::backends::DatasetView;
use crate::config::MappingConfig;
use crate::dao::Dao;
use crate::error::{MappingResult, TechnicalError};
use crate::model::core_trait::{Bean, ComponentKind, KeyPart, KeyValue};
use crate::model::primary_key::{Key, KeyError};
use crate::registry::DaoRegistry;

/// Chain of bean types currently being resolved
#[derive(Debug, Clone)]
pub struct ResolutionPath {
    stack: Vec<&'static str>,
    config: MappingConfig,
}

impl ResolutionPath {
    pub fn new(config: MappingConfig) -> Self {
        Self {
            stack: Vec::new(),
            config,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn config(&self) -> MappingConfig {
        self.config
    }

    fn enter(&mut self, bean_type: &'static str) -> MappingResult<()> {
        if self.stack.contains(&bean_type) {
            let mut chain = self.stack.clone();
            chain.push(bean_type);
            let path = chain.join(" -> ");
            warn!(path = %path, "Cyclic key graph detected");
            return Err(TechnicalError::CyclicKey { path }.into());
        }
        if self.stack.len() >= self.config.max_key_depth {
            return Err(TechnicalError::KeyDepthExceeded {
                depth: self.stack.len() + 1,
                limit: self.config.max_key_depth,
            }
            .into());
        }
        self.stack.push(bean_type);
        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
    }
}

pub(crate) fn derive_within<B: Bean>(
    registry: &'static DaoRegistry,
    bean: &B,
    path: &mut ResolutionPath,
) -> MappingResult<Option<Key>> {
    path.enter(B::BEAN_TYPE)?;
    let result = derive_components(registry, bean, path);
    path.leave();
    result
}

fn derive_components<B: Bean>(
    registry: &'static DaoRegistry,
    bean: &B,
    path: &mut ResolutionPath,
) -> MappingResult<Option<Key>> {
    let shape = B::key_shape();
    let parts = bean.key_parts();
    if parts.len() != shape.len() {
        return Err(TechnicalError::Marshalling {
            field: B::table_path().to_string(),
            message: format!(
                "{} key components declared but {} supplied",
                shape.len(),
                parts.len()
            ),
        }
        .into());
    }

    let mut components = Vec::with_capacity(shape.len());
    for (component, part) in shape.iter().zip(parts) {
        let segment = match (component.kind, part) {
            (ComponentKind::Scalar, KeyPart::Scalar(value)) => {
                value.as_ref().and_then(|v| v.key_component())
            }
            (ComponentKind::Reference { bean_type }, KeyPart::Reference(nested)) => match nested {
                Some(nested) => registry
                    .resolve(bean_type)?
                    .derive_key_dyn(registry, nested, path)?
                    .map(|key| key.to_string()),
                None => None,
            },
            _ => {
                return Err(TechnicalError::Marshalling {
                    field: component.field.to_string(),
                    message: "key part does not match the declared component kind".to_string(),
                }
                .into())
            }
        };

        match segment {
            Some(segment) => components.push(segment),
            None => return Ok(None),
        }
    }

    Ok(Some(Key::new(components)?))
}

pub(crate) fn reconstruct_within<B: Bean>(
    registry: &'static DaoRegistry,
    dataset: Option<&dyn DatasetView>,
    key: &Key,
    path: &mut ResolutionPath,
) -> MappingResult<B> {
    path.enter(B::BEAN_TYPE)?;
    let result = reconstruct_components(registry, dataset, key, path);
    path.leave();
    result
}

fn reconstruct_components<B: Bean>(
    registry: &'static DaoRegistry,
    dataset: Option<&dyn DatasetView>,
    key: &Key,
    path: &mut ResolutionPath,
) -> MappingResult<B> {
    let shape = B::key_shape();
    if key.len() != shape.len() {
        return Err(KeyError::ShapeMismatch {
            table: B::table_path().to_string(),
            key: key.to_string(),
            expected: shape.len(),
            found: key.len(),
        }
        .into());
    }

    let mut bean = B::default();
    for (index, (component, text)) in shape.iter().zip(key.components()).enumerate() {
        let value = match component.kind {
            ComponentKind::Scalar => KeyValue::Scalar(text.clone()),
            ComponentKind::Reference { bean_type } => {
                let resolver = registry.resolve(bean_type)?;
                let nested_key = Key::parse(text)?;
                let existing = match dataset {
                    Some(dataset) => dataset.lookup(resolver.table_path(), &nested_key)?,
                    None => None,
                };
                let nested = match existing {
                    Some(record) => resolver.read_dyn(registry, path.config(), &record)?,
                    None => resolver.reconstruct_dyn(registry, dataset, &nested_key, path)?,
                };
                KeyValue::Reference(nested)
            }
        };
        bean.set_key_part(index, value)?;
    }

    Ok(bean)
}

impl<B: Bean> Dao<B> {
    /// Derive the bean's key; `None` when any component is absent
    pub fn derive_key(&self, bean: &B) -> MappingResult<Option<Key>> {
        let mut path = ResolutionPath::new(self.config);
        derive_within(self.registry, bean, &mut path)
    }

    /// Formatted key of the bean, or `None` while it is not identifiable
    pub fn record_primary_key(&self, bean: &B) -> MappingResult<Option<String>> {
        let key = self.derive_key(bean)?.map(|key| key.to_string());
        debug!(table = B::table_path(), key = ?key, "Record primary key computed");
        Ok(key)
    }

    /// Key-only bean rebuilt from `key` without consulting any dataset
    pub fn from_primary_key(&self, key: &Key) -> MappingResult<B> {
        let mut path = ResolutionPath::new(self.config);
        reconstruct_within(self.registry, None, key, &mut path)
    }

    /// Bean representing the identity `key_text` in `dataset`. Nested key
    /// targets present in the dataset are read in full; missing ones are
    /// rebuilt from their keys alone.
    pub fn get_instance_from_primary_key(
        &self,
        dataset: &dyn DatasetView,
        key_text: &str,
    ) -> MappingResult<B> {
        let key = Key::parse(key_text)?;
        let mut path = ResolutionPath::new(self.config);
        reconstruct_within(self.registry, Some(dataset), &key, &mut path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use crate::model::binding::BeanState;
    use crate::model::core_trait::KeyComponent;
    use crate::model::fields::{FieldReader, FieldWriter};
    use once_cell::sync::Lazy;

    static REGISTRY: Lazy<DaoRegistry> = Lazy::new(|| {
        let registry = DaoRegistry::new();
        crate::register_beans!(in &registry; Country, Region, Loop);
        registry
    });

    #[derive(Debug, Clone, Default)]
    struct Country {
        state: BeanState,
        code: Option<String>,
    }

    #[derive(Debug, Clone, Default)]
    struct Region {
        state: BeanState,
        country: Option<Country>,
        number: Option<i64>,
    }

    /// Key references its own type
    #[derive(Debug, Clone, Default)]
    struct Loop {
        state: BeanState,
        parent: Option<Box<Loop>>,
    }

    macro_rules! state_accessors {
        () => {
            fn state(&self) -> &BeanState {
                &self.state
            }

            fn state_mut(&mut self) -> &mut BeanState {
                &mut self.state
            }

            fn unmarshal(&mut self, _reader: &FieldReader<'_>) -> MappingResult<()> {
                Ok(())
            }

            fn marshal(&self, _writer: &mut FieldWriter<'_>) -> MappingResult<()> {
                Ok(())
            }
        };
    }

    impl Bean for Country {
        const BEAN_TYPE: &'static str = "key_test::Country";

        fn table_path() -> &'static str {
            "/root/Country"
        }

        fn key_shape() -> &'static [KeyComponent] {
            const SHAPE: &[KeyComponent] = &[KeyComponent::scalar("./code")];
            SHAPE
        }

        fn key_parts(&self) -> Vec<KeyPart<'_>> {
            vec![KeyPart::scalar(self.code.clone())]
        }

        fn set_key_part(&mut self, _index: usize, value: KeyValue) -> MappingResult<()> {
            self.code = Some(value.parse_scalar("./code")?);
            Ok(())
        }

        state_accessors!();
    }

    impl Bean for Region {
        const BEAN_TYPE: &'static str = "key_test::Region";

        fn table_path() -> &'static str {
            "/root/Region"
        }

        fn key_shape() -> &'static [KeyComponent] {
            const SHAPE: &[KeyComponent] = &[
                KeyComponent::reference("./country", Country::BEAN_TYPE),
                KeyComponent::scalar("./number"),
            ];
            SHAPE
        }

        fn key_parts(&self) -> Vec<KeyPart<'_>> {
            vec![
                KeyPart::reference(self.country.as_ref()),
                KeyPart::scalar(self.number),
            ]
        }

        fn set_key_part(&mut self, index: usize, value: KeyValue) -> MappingResult<()> {
            match index {
                0 => self.country = Some(value.into_bean("./country")?),
                _ => self.number = Some(value.parse_scalar("./number")?),
            }
            Ok(())
        }

        state_accessors!();
    }

    impl Bean for Loop {
        const BEAN_TYPE: &'static str = "key_test::Loop";

        fn table_path() -> &'static str {
            "/root/Loop"
        }

        fn key_shape() -> &'static [KeyComponent] {
            const SHAPE: &[KeyComponent] = &[KeyComponent::reference("./parent", "key_test::Loop")];
            SHAPE
        }

        fn key_parts(&self) -> Vec<KeyPart<'_>> {
            vec![KeyPart::reference(self.parent.as_deref())]
        }

        fn set_key_part(&mut self, _index: usize, value: KeyValue) -> MappingResult<()> {
            self.parent = Some(Box::new(value.into_bean("./parent")?));
            Ok(())
        }

        state_accessors!();
    }

    fn dao<B: Bean>() -> Dao<B> {
        Dao::with_registry(&REGISTRY)
    }

    fn region(code: &str, number: i64) -> Region {
        Region {
            country: Some(Country {
                code: Some(code.to_string()),
                ..Default::default()
            }),
            number: Some(number),
            ..Default::default()
        }
    }

    #[test]
    fn test_nested_key_embeds_formatted_component() {
        let key = dao::<Region>().derive_key(&region("FR", 75)).unwrap().unwrap();
        assert_eq!(key.components(), ["FR".to_string(), "75".to_string()]);
        assert_eq!(key.to_string(), "FR|75");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let bean = region("F|R", 13);
        let first = dao::<Region>().record_primary_key(&bean).unwrap();
        let second = dao::<Region>().record_primary_key(&bean).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some(r"F\\\|R|13"));

        let key = dao::<Region>().derive_key(&bean).unwrap().unwrap();
        assert_eq!(key.component(0), Some(r"F\|R"));
    }

    #[test]
    fn test_absent_component_leaves_key_undefined() {
        let mut bean = region("FR", 75);
        bean.number = None;
        assert_eq!(dao::<Region>().record_primary_key(&bean).unwrap(), None);

        let mut bean = region("FR", 75);
        bean.country.as_mut().unwrap().code = None;
        assert_eq!(dao::<Region>().derive_key(&bean).unwrap(), None);
    }

    #[test]
    fn test_reconstruct_inverts_derive() {
        let key = dao::<Region>().derive_key(&region("FR", 75)).unwrap().unwrap();
        let rebuilt = dao::<Region>().from_primary_key(&key).unwrap();

        assert_eq!(rebuilt.number, Some(75));
        assert_eq!(rebuilt.country.as_ref().and_then(|c| c.code.as_deref()), Some("FR"));
        assert!(!rebuilt.state.is_bound());
        assert_eq!(dao::<Region>().derive_key(&rebuilt).unwrap(), Some(key));
    }

    #[test]
    fn test_reconstruct_rejects_bad_keys() {
        let short = Key::single("FR");
        assert!(matches!(
            dao::<Region>().from_primary_key(&short),
            Err(MappingError::Technical(TechnicalError::Key(KeyError::ShapeMismatch { .. })))
        ));

        let bad_number = Key::new(["FR", "seventy"]).unwrap();
        assert!(matches!(
            dao::<Region>().from_primary_key(&bad_number),
            Err(MappingError::Technical(TechnicalError::Key(KeyError::InvalidComponent { .. })))
        ));
    }

    #[test]
    fn test_cyclic_key_graph_fails() {
        let bean = Loop {
            parent: Some(Box::new(Loop::default())),
            ..Default::default()
        };
        assert!(matches!(
            dao::<Loop>().derive_key(&bean),
            Err(MappingError::Technical(TechnicalError::CyclicKey { .. }))
        ));

        assert!(matches!(
            dao::<Loop>().from_primary_key(&Key::single("x")),
            Err(MappingError::Technical(TechnicalError::CyclicKey { .. }))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let shallow = Dao::<Region>::with_registry(&REGISTRY)
            .with_config(MappingConfig::default().with_max_key_depth(1));
        assert!(matches!(
            shallow.derive_key(&region("FR", 75)),
            Err(MappingError::Technical(TechnicalError::KeyDepthExceeded { depth: 2, limit: 1 }))
        ));
    }

    #[test]
    fn test_unregistered_nested_type_is_missing_dao() {
        let registry: &'static DaoRegistry = Box::leak(Box::new(DaoRegistry::new()));
        registry.register::<Region>();

        let result = Dao::<Region>::with_registry(registry).derive_key(&region("FR", 75));
        assert!(matches!(
            result,
            Err(MappingError::Technical(TechnicalError::MissingDao { .. }))
        ));
    }
}
