//! Shared fixtures: a Country / Region / City key chain, a pair of beans
//! whose keys reference each other, rule-based permissions and a dataset
//! wrapper that instruments cursors.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mdm_orm::backends::memory::{MemoryRepository, TableSchema};
use mdm_orm::{
    register_beans, AccessRight, Bean, BeanState, DatasetView, FieldReader, FieldSource,
    FieldValue, FieldWriter, Key, KeyComponent, KeyPart, KeyValue, MappingResult,
    PermissionOracle, Record, RecordCursor, RecordVisibility, ScanRequest, StoreError,
    StoreResult,
};
use tracing_subscriber::EnvFilter;

pub const DATASET: &str = "master";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Country {
    pub state: BeanState,
    pub code: Option<String>,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub population: Option<i64>,
}

impl Bean for Country {
    const BEAN_TYPE: &'static str = "fixtures::Country";

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

    fn state(&self) -> &BeanState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BeanState {
        &mut self.state
    }

    fn unmarshal(&mut self, reader: &FieldReader<'_>) -> MappingResult<()> {
        self.code = reader.text("./code");
        self.name = reader.text("./name");
        self.currency = reader.text("./currency");
        self.status = reader.text("./status");
        self.population = reader.int("./population");
        Ok(())
    }

    fn marshal(&self, writer: &mut FieldWriter<'_>) -> MappingResult<()> {
        writer.write("./code", self.code.clone());
        writer.write("./name", self.name.clone());
        writer.write("./currency", self.currency.clone());
        if let Some(status) = &self.status {
            writer.write("./status", status.as_str());
        }
        if let Some(population) = self.population {
            writer.write("./population", population);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region {
    pub state: BeanState,
    pub country: Option<Country>,
    pub code: Option<String>,
    pub name: Option<String>,
}

impl Bean for Region {
    const BEAN_TYPE: &'static str = "fixtures::Region";

    fn table_path() -> &'static str {
        "/root/Region"
    }

    fn key_shape() -> &'static [KeyComponent] {
        const SHAPE: &[KeyComponent] = &[
            KeyComponent::reference("./country", Country::BEAN_TYPE),
            KeyComponent::scalar("./code"),
        ];
        SHAPE
    }

    fn key_parts(&self) -> Vec<KeyPart<'_>> {
        vec![
            KeyPart::reference(self.country.as_ref()),
            KeyPart::scalar(self.code.clone()),
        ]
    }

    fn set_key_part(&mut self, index: usize, value: KeyValue) -> MappingResult<()> {
        match index {
            0 => self.country = Some(value.into_bean("./country")?),
            _ => self.code = Some(value.parse_scalar("./code")?),
        }
        Ok(())
    }

    fn state(&self) -> &BeanState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BeanState {
        &mut self.state
    }

    fn unmarshal(&mut self, reader: &FieldReader<'_>) -> MappingResult<()> {
        self.country = reader.reference::<Country>("./country")?;
        self.code = reader.text("./code");
        self.name = reader.text("./name");
        Ok(())
    }

    fn marshal(&self, writer: &mut FieldWriter<'_>) -> MappingResult<()> {
        writer.write_reference("./country", self.country.as_ref())?;
        writer.write("./code", self.code.clone());
        writer.write("./name", self.name.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct City {
    pub state: BeanState,
    pub region: Option<Region>,
    pub name: Option<String>,
    pub population: Option<i64>,
}

impl Bean for City {
    const BEAN_TYPE: &'static str = "fixtures::City";

    fn table_path() -> &'static str {
        "/root/City"
    }

    fn key_shape() -> &'static [KeyComponent] {
        const SHAPE: &[KeyComponent] = &[
            KeyComponent::reference("./region", Region::BEAN_TYPE),
            KeyComponent::scalar("./name"),
        ];
        SHAPE
    }

    fn key_parts(&self) -> Vec<KeyPart<'_>> {
        vec![
            KeyPart::reference(self.region.as_ref()),
            KeyPart::scalar(self.name.clone()),
        ]
    }

    fn set_key_part(&mut self, index: usize, value: KeyValue) -> MappingResult<()> {
        match index {
            0 => self.region = Some(value.into_bean("./region")?),
            _ => self.name = Some(value.parse_scalar("./name")?),
        }
        Ok(())
    }

    fn state(&self) -> &BeanState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BeanState {
        &mut self.state
    }

    fn unmarshal(&mut self, reader: &FieldReader<'_>) -> MappingResult<()> {
        self.region = reader.reference::<Region>("./region")?;
        self.name = reader.text("./name");
        self.population = reader.int("./population");
        Ok(())
    }

    fn marshal(&self, writer: &mut FieldWriter<'_>) -> MappingResult<()> {
        writer.write_reference("./region", self.region.as_ref())?;
        writer.write("./name", self.name.clone());
        writer.write("./population", self.population);
        Ok(())
    }
}

/// Keyed by the chicken it came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Egg {
    pub state: BeanState,
    pub chicken: Option<Box<Chicken>>,
}

/// Keyed by the egg it hatched from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chicken {
    pub state: BeanState,
    pub egg: Option<Box<Egg>>,
}

impl Bean for Egg {
    const BEAN_TYPE: &'static str = "fixtures::Egg";

    fn table_path() -> &'static str {
        "/root/Egg"
    }

    fn key_shape() -> &'static [KeyComponent] {
        const SHAPE: &[KeyComponent] = &[KeyComponent::reference("./chicken", Chicken::BEAN_TYPE)];
        SHAPE
    }

    fn key_parts(&self) -> Vec<KeyPart<'_>> {
        vec![KeyPart::reference(self.chicken.as_deref())]
    }

    fn set_key_part(&mut self, _index: usize, value: KeyValue) -> MappingResult<()> {
        self.chicken = Some(Box::new(value.into_bean("./chicken")?));
        Ok(())
    }

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
}

impl Bean for Chicken {
    const BEAN_TYPE: &'static str = "fixtures::Chicken";

    fn table_path() -> &'static str {
        "/root/Chicken"
    }

    fn key_shape() -> &'static [KeyComponent] {
        const SHAPE: &[KeyComponent] = &[KeyComponent::reference("./egg", Egg::BEAN_TYPE)];
        SHAPE
    }

    fn key_parts(&self) -> Vec<KeyPart<'_>> {
        vec![KeyPart::reference(self.egg.as_deref())]
    }

    fn set_key_part(&mut self, _index: usize, value: KeyValue) -> MappingResult<()> {
        self.egg = Some(Box::new(value.into_bean("./egg")?));
        Ok(())
    }

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
}

/// Install a test log writer and register every fixture bean with the
/// global registry
pub fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    register_beans!(Country, Region, City, Egg, Chicken);
}

/// Repository with the Country / Region / City tables. Country codes are
/// upper-cased by a trigger, names are required, status defaults to
/// "active".
pub fn repository() -> Arc<MemoryRepository> {
    setup();
    let repository = MemoryRepository::new();
    repository.create_dataset(DATASET).unwrap();
    repository
        .define_table(
            DATASET,
            TableSchema::new(Country::table_path(), ["./code"])
                .with_default("./status", "active")
                .with_required("./name")
                .with_trigger(|values| {
                    if let Some(FieldValue::Text(code)) = values.get("./code").cloned() {
                        values.insert("./code".to_string(), FieldValue::Text(code.to_uppercase()));
                    }
                }),
        )
        .unwrap();
    repository
        .define_table(
            DATASET,
            TableSchema::new(Region::table_path(), ["./country", "./code"])
                .with_foreign_key("./country", Country::table_path()),
        )
        .unwrap();
    repository
        .define_table(
            DATASET,
            TableSchema::new(City::table_path(), ["./region", "./name"])
                .with_foreign_key("./region", Region::table_path()),
        )
        .unwrap();
    Arc::new(repository)
}

pub fn country(code: &str, name: &str) -> Country {
    Country {
        code: Some(code.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn region(country_code: &str, code: &str, name: &str) -> Region {
    Region {
        country: Some(Country {
            code: Some(country_code.to_string()),
            ..Default::default()
        }),
        code: Some(code.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn city(region: Region, name: &str, population: i64) -> City {
    City {
        region: Some(region),
        name: Some(name.to_string()),
        population: Some(population),
        ..Default::default()
    }
}

/// Hides listed fields everywhere and listed records entirely
#[derive(Debug, Default)]
pub struct Rules {
    pub hidden_fields: Vec<&'static str>,
    pub hidden_keys: Vec<String>,
}

impl PermissionOracle for Rules {
    fn record_visibility(&self, record: &dyn FieldSource) -> RecordVisibility {
        let hidden = record
            .record_ref()
            .map_or(false, |r| self.hidden_keys.contains(&r.key.to_string()));
        if hidden {
            RecordVisibility::Hidden
        } else {
            RecordVisibility::Visible
        }
    }

    fn field_access(&self, path: &str, _record: &dyn FieldSource) -> AccessRight {
        if self.hidden_fields.contains(&path) {
            AccessRight::Hidden
        } else {
            AccessRight::ReadWrite
        }
    }
}

/// Dataset wrapper counting cursor closes, optionally failing a scan after
/// a number of records
pub struct InstrumentedDataset<'a> {
    pub inner: &'a dyn DatasetView,
    pub closes: Arc<AtomicUsize>,
    pub fail_after: Option<usize>,
}

impl<'a> InstrumentedDataset<'a> {
    pub fn new(inner: &'a dyn DatasetView) -> Self {
        Self {
            inner,
            closes: Arc::new(AtomicUsize::new(0)),
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, records: usize) -> Self {
        self.fail_after = Some(records);
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct InstrumentedCursor<'a> {
    inner: Box<dyn RecordCursor + 'a>,
    closes: Arc<AtomicUsize>,
    delivered: usize,
    fail_after: Option<usize>,
}

impl<'a> RecordCursor for InstrumentedCursor<'a> {
    fn next_record(&mut self) -> StoreResult<Option<Record>> {
        if self.fail_after == Some(self.delivered) {
            return Err(StoreError::OperationFailed("cursor interrupted".to_string()));
        }
        self.delivered += 1;
        self.inner.next_record()
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

impl<'a> DatasetView for InstrumentedDataset<'a> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn lookup(&self, table: &str, key: &Key) -> StoreResult<Option<Record>> {
        self.inner.lookup(table, key)
    }

    fn scan<'b>(&'b self, table: &str, request: &ScanRequest) -> StoreResult<Box<dyn RecordCursor + 'b>> {
        Ok(Box::new(InstrumentedCursor {
            inner: self.inner.scan(table, request)?,
            closes: Arc::clone(&self.closes),
            delivered: 0,
            fail_after: self.fail_after,
        }))
    }
}
