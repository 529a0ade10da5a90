// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::os::raw::c_void;
use std::time::SystemTime;

use pprof::protos;

#[derive(Hash, PartialEq, Eq)]
enum LocationKey {
    Address(usize),
    Named(String),
}

/// Incrementally assembles a `perftools.profiles.Profile`, interning strings,
/// functions and locations as samples are added.
pub(crate) struct ProfileBuilder {
    strings: Vec<String>,
    string_ids: HashMap<String, i64>,
    functions: Vec<protos::Function>,
    function_ids: HashMap<(String, String), u64>,
    locations: Vec<protos::Location>,
    location_ids: HashMap<LocationKey, u64>,
    samples: Vec<protos::Sample>,
    sample_types: Vec<protos::ValueType>,
    period_type: Option<protos::ValueType>,
    period: i64,
}

impl ProfileBuilder {
    pub(crate) fn new(sample_types: &[(&str, &str)]) -> Self {
        let mut builder = ProfileBuilder {
            strings: Vec::new(),
            string_ids: HashMap::new(),
            functions: Vec::new(),
            function_ids: HashMap::new(),
            locations: Vec::new(),
            location_ids: HashMap::new(),
            samples: Vec::new(),
            sample_types: Vec::new(),
            period_type: None,
            period: 0,
        };
        // string_table[0] must be "".
        builder.string("");
        let sample_types = sample_types
            .iter()
            .map(|(ty, unit)| builder.value_type(ty, unit))
            .collect();
        builder.sample_types = sample_types;
        builder
    }

    pub(crate) fn period(mut self, ty: (&str, &str), period: i64) -> Self {
        self.period_type = Some(self.value_type(ty.0, ty.1));
        self.period = period;
        self
    }

    fn value_type(&mut self, ty: &str, unit: &str) -> protos::ValueType {
        protos::ValueType {
            ty: self.string(ty),
            unit: self.string(unit),
        }
    }

    fn string(&mut self, s: &str) -> i64 {
        if let Some(id) = self.string_ids.get(s) {
            return *id;
        }
        let id = self.strings.len() as i64;
        self.strings.push(s.to_owned());
        self.string_ids.insert(s.to_owned(), id);
        id
    }

    fn function(&mut self, name: &str, filename: &str) -> u64 {
        let key = (name.to_owned(), filename.to_owned());
        if let Some(id) = self.function_ids.get(&key) {
            return *id;
        }
        let id = self.functions.len() as u64 + 1;
        let name = self.string(name);
        let filename = self.string(filename);
        self.functions.push(protos::Function {
            id,
            name,
            system_name: name,
            filename,
            ..Default::default()
        });
        self.function_ids.insert(key, id);
        id
    }

    fn address_location(&mut self, ip: usize) -> u64 {
        if let Some(id) = self.location_ids.get(&LocationKey::Address(ip)) {
            return *id;
        }

        let mut symbols = Vec::new();
        backtrace::resolve(ip as *mut c_void, |symbol| {
            let name = match symbol.name() {
                Some(name) => name.to_string(),
                None => format!("{:#x}", ip),
            };
            let filename = symbol
                .filename()
                .map(|filename| filename.display().to_string())
                .unwrap_or_default();
            symbols.push((name, filename, symbol.lineno().unwrap_or(0)));
        });
        if symbols.is_empty() {
            symbols.push((format!("{:#x}", ip), String::new(), 0));
        }

        let line = symbols
            .iter()
            .map(|(name, filename, lineno)| protos::Line {
                function_id: self.function(name, filename),
                line: i64::from(*lineno),
                ..Default::default()
            })
            .collect();

        let id = self.locations.len() as u64 + 1;
        self.locations.push(protos::Location {
            id,
            address: ip as u64,
            line,
            ..Default::default()
        });
        self.location_ids.insert(LocationKey::Address(ip), id);
        id
    }

    fn named_location(&mut self, name: &str) -> u64 {
        let key = LocationKey::Named(name.to_owned());
        if let Some(id) = self.location_ids.get(&key) {
            return *id;
        }
        let function_id = self.function(name, "");
        let id = self.locations.len() as u64 + 1;
        self.locations.push(protos::Location {
            id,
            line: vec![protos::Line {
                function_id,
                ..Default::default()
            }],
            ..Default::default()
        });
        self.location_ids.insert(key, id);
        id
    }

    /// Adds a sample whose stack is a list of instruction pointers, leaf first.
    pub(crate) fn add_sample(&mut self, ips: &[usize], value: Vec<i64>) {
        let location_id = ips.iter().map(|ip| self.address_location(*ip)).collect();
        self.samples.push(protos::Sample {
            location_id,
            value,
            ..Default::default()
        });
    }

    /// Adds a sample whose stack frames are already symbolic names, leaf first.
    pub(crate) fn add_named_sample(&mut self, names: &[&str], value: Vec<i64>) {
        let location_id = names.iter().map(|name| self.named_location(name)).collect();
        self.samples.push(protos::Sample {
            location_id,
            value,
            ..Default::default()
        });
    }

    pub(crate) fn build(self) -> protos::Profile {
        let time_nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as i64)
            .unwrap_or_default();

        protos::Profile {
            sample_type: self.sample_types,
            sample: self.samples,
            location: self.locations,
            function: self.functions,
            string_table: self.strings,
            time_nanos,
            period_type: self.period_type,
            period: self.period,
            ..Default::default()
        }
    }
}
