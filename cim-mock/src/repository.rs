use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cim_core::{
    AssociationQuery, CimInstance, CimInstanceName, CimStatus, CimValue, MethodParams,
    MethodResult, Result, WbemClient, WbemError,
};
use tracing::debug;

/// Namespace given to instances added without one.
pub const DEFAULT_NAMESPACE: &str = "root/mock";

/// A recorded WBEM operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    EnumerateInstances { classname: String, namespace: Option<String> },
    EnumerateInstanceNames { classname: String, namespace: Option<String> },
    Associators { object: CimInstanceName, query: AssociationQuery },
    AssociatorNames { object: CimInstanceName, query: AssociationQuery },
    References { object: CimInstanceName, query: AssociationQuery },
    GetInstance { name: CimInstanceName },
    InvokeMethod { method: String, object: CimInstanceName, params: MethodParams },
    DeleteInstance { name: CimInstanceName },
}

/// Which operations an injected error applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// Enumerations naming this class.
    Class(String),
    /// Enumerations targeting this namespace.
    Namespace(String),
    /// Associator/reference walks through this association class.
    Association(String),
    /// Associator walks asking for this result class.
    ResultClass(String),
}

#[derive(Default)]
struct State {
    instances: Vec<CimInstance>,
    parents: HashMap<String, String>,
    pending_versions: HashMap<CimInstanceName, VecDeque<CimInstance>>,
    failures: Vec<(FailOn, WbemError)>,
    methods: HashMap<String, VecDeque<Result<MethodResult>>>,
    calls: Vec<Call>,
}

impl State {
    /// Class inheritance check.
    ///
    /// Explicit parents registered with [`MockWbem::define_class`] are
    /// followed first; otherwise a vendor class `XYZ_Foo` is taken to derive
    /// from `CIM_Foo`.
    fn is_a(&self, classname: &str, target: &str) -> bool {
        let mut current = classname.to_string();
        for _ in 0..16 {
            if current.eq_ignore_ascii_case(target) {
                return true;
            }
            if let (Some(cur), Some(base)) = (current.split_once('_'), target.strip_prefix("CIM_"))
            {
                if cur.1.eq_ignore_ascii_case(base) {
                    return true;
                }
            }
            match self.parents.get(&current) {
                Some(parent) => current = parent.clone(),
                None => return false,
            }
        }
        false
    }

    fn position(&self, name: &CimInstanceName) -> Option<usize> {
        self.instances.iter().position(|i| i.path.same_object(name))
    }

    /// Read an instance, advancing it to its next scripted version first.
    fn read(&mut self, index: usize) -> CimInstance {
        let key = self.instances[index].path.local();
        if let Some(next) = self.pending_versions.get_mut(&key).and_then(VecDeque::pop_front) {
            let mut next = next;
            next.path = self.instances[index].path.clone();
            self.instances[index] = next;
        }
        self.instances[index].clone()
    }

    fn failure(&self, matches: impl Fn(&FailOn) -> bool) -> Option<WbemError> {
        self.failures
            .iter()
            .find(|(on, _)| matches(on))
            .map(|(_, err)| err.clone())
    }

    fn association_failure(&self, assoc: Option<&str>, result: Option<&str>) -> Option<WbemError> {
        self.failure(|on| match on {
            FailOn::Association(c) => assoc.is_some_and(|a| a.eq_ignore_ascii_case(c)),
            FailOn::ResultClass(c) => result.is_some_and(|r| r.eq_ignore_ascii_case(c)),
            _ => false,
        })
    }

    /// Indices of association instances that refer to `object` in `role`,
    /// paired with the name of the referring property.
    fn links(&self, object: &CimInstanceName, assoc_class: Option<&str>, role: Option<&str>) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        for (index, inst) in self.instances.iter().enumerate() {
            if let Some(assoc) = assoc_class {
                if !self.is_a(inst.classname(), assoc) {
                    continue;
                }
            }
            for (prop, value) in &inst.properties {
                let CimValue::Reference(target) = value else {
                    continue;
                };
                if !target.same_object(object) {
                    continue;
                }
                if role.is_some_and(|r| !r.eq_ignore_ascii_case(prop)) {
                    continue;
                }
                out.push((index, prop.clone()));
            }
        }
        out
    }

    fn associated(&mut self, object: &CimInstanceName, query: &AssociationQuery) -> Vec<CimInstance> {
        let links = self.links(object, query.assoc_class.as_deref(), query.role.as_deref());
        let mut targets: Vec<CimInstanceName> = Vec::new();
        for (index, source_role) in links {
            for (prop, value) in &self.instances[index].properties {
                let CimValue::Reference(target) = value else {
                    continue;
                };
                if prop == &source_role {
                    continue;
                }
                if query
                    .result_role
                    .as_deref()
                    .is_some_and(|r| !r.eq_ignore_ascii_case(prop))
                {
                    continue;
                }
                if !targets.iter().any(|t| t.same_object(target)) {
                    targets.push(target.clone());
                }
            }
        }

        let mut out = Vec::new();
        for target in targets {
            let Some(index) = self.position(&target) else {
                continue;
            };
            if let Some(result) = query.result_class.as_deref() {
                if !self.is_a(self.instances[index].classname(), result) {
                    continue;
                }
            }
            out.push(self.read(index));
        }
        out
    }
}

/// In-memory CIM repository implementing [`WbemClient`].
pub struct MockWbem {
    state: Mutex<State>,
    default_namespace: String,
}

impl Default for MockWbem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWbem {
    pub fn new() -> Self {
        Self::with_default_namespace(DEFAULT_NAMESPACE)
    }

    /// Repository whose connection default namespace is `namespace`.
    pub fn with_default_namespace(namespace: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            default_namespace: namespace.to_string(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Repository setup
    // ------------------------------------------------------------------------

    /// Declare `classname` as a subclass of `parent`.
    pub fn define_class(&self, classname: &str, parent: &str) {
        self.state()
            .parents
            .insert(classname.to_string(), parent.to_string());
    }

    /// Add or replace an instance. Instances without a namespace land in the
    /// default namespace.
    pub fn add_instance(&self, mut instance: CimInstance) -> CimInstanceName {
        if instance.path.namespace.is_none() {
            instance.path.namespace = Some(self.default_namespace.clone());
        }
        let path = instance.path.clone();
        let mut state = self.state();
        match state.position(&path) {
            Some(index) => state.instances[index] = instance,
            None => state.instances.push(instance),
        }
        path
    }

    /// Link two objects through an association instance of `assoc_class`.
    pub fn associate(
        &self,
        assoc_class: &str,
        (role_a, a): (&str, &CimInstanceName),
        (role_b, b): (&str, &CimInstanceName),
    ) -> CimInstanceName {
        self.associate_with(assoc_class, (role_a, a), (role_b, b), Vec::new())
    }

    /// Like [`MockWbem::associate`], with extra association properties.
    pub fn associate_with(
        &self,
        assoc_class: &str,
        (role_a, a): (&str, &CimInstanceName),
        (role_b, b): (&str, &CimInstanceName),
        properties: Vec<(&str, CimValue)>,
    ) -> CimInstanceName {
        let path = CimInstanceName::new(assoc_class)
            .with_key(role_a, a.local())
            .with_key(role_b, b.local());
        let mut instance = CimInstance::new(path)
            .with(role_a, a.clone())
            .with(role_b, b.clone());
        for (name, value) in properties {
            instance.set(name, value);
        }
        self.add_instance(instance)
    }

    /// Successive reads of `name` return these versions in order; the last
    /// one sticks.
    pub fn evolve(&self, name: &CimInstanceName, versions: Vec<CimInstance>) {
        self.state()
            .pending_versions
            .insert(name.local(), versions.into_iter().collect());
    }

    pub fn instance(&self, name: &CimInstanceName) -> Option<CimInstance> {
        let state = self.state();
        state.position(name).map(|i| state.instances[i].clone())
    }

    pub fn fail(&self, on: FailOn, error: WbemError) {
        self.state().failures.push((on, error));
    }

    /// Queue the next result of `method`. Results are consumed in order.
    pub fn expect_method(&self, method: &str, result: Result<MethodResult>) {
        self.state()
            .methods
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    // ------------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Names of invoked extrinsic methods, in call order.
    pub fn invoked_methods(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::InvokeMethod { method, .. } => Some(method.clone()),
                _ => None,
            })
            .collect()
    }

    /// Parameters of each call to `method`, in call order.
    pub fn method_params(&self, method: &str) -> Vec<MethodParams> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::InvokeMethod { method: m, params, .. } if m == method => Some(params.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<CimInstanceName> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::DeleteInstance { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn not_found(name: &CimInstanceName) -> WbemError {
        WbemError::cim(CimStatus::NotFound, format!("no instance {}", name))
    }

    fn enumerate(&self, classname: &str, namespace: Option<&str>) -> Result<Vec<CimInstance>> {
        let namespace = namespace.unwrap_or(&self.default_namespace).to_string();
        let mut state = self.state();
        if let Some(err) = state.failure(|on| match on {
            FailOn::Class(c) => c.eq_ignore_ascii_case(classname),
            FailOn::Namespace(ns) => ns == &namespace,
            _ => false,
        }) {
            return Err(err);
        }
        let indices: Vec<usize> = state
            .instances
            .iter()
            .enumerate()
            .filter(|(_, i)| {
                i.path.namespace.as_deref() == Some(namespace.as_str())
                    && state.is_a(i.classname(), classname)
            })
            .map(|(index, _)| index)
            .collect();
        Ok(indices.into_iter().map(|i| state.read(i)).collect())
    }
}

impl WbemClient for MockWbem {
    async fn enumerate_instances(
        &self,
        classname: &str,
        namespace: Option<&str>,
        _property_list: Option<&[&str]>,
    ) -> Result<Vec<CimInstance>> {
        self.state().calls.push(Call::EnumerateInstances {
            classname: classname.to_string(),
            namespace: namespace.map(str::to_string),
        });
        let out = self.enumerate(classname, namespace)?;
        debug!(classname, count = out.len(), "mock enumerate_instances");
        Ok(out)
    }

    async fn enumerate_instance_names(
        &self,
        classname: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<CimInstanceName>> {
        self.state().calls.push(Call::EnumerateInstanceNames {
            classname: classname.to_string(),
            namespace: namespace.map(str::to_string),
        });
        Ok(self
            .enumerate(classname, namespace)?
            .into_iter()
            .map(|i| i.path)
            .collect())
    }

    async fn associators(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> Result<Vec<CimInstance>> {
        let mut state = self.state();
        state.calls.push(Call::Associators {
            object: object.clone(),
            query: query.clone(),
        });
        if let Some(err) =
            state.association_failure(query.assoc_class.as_deref(), query.result_class.as_deref())
        {
            return Err(err);
        }
        Ok(state.associated(object, query))
    }

    async fn associator_names(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> Result<Vec<CimInstanceName>> {
        let mut state = self.state();
        state.calls.push(Call::AssociatorNames {
            object: object.clone(),
            query: query.clone(),
        });
        if let Some(err) =
            state.association_failure(query.assoc_class.as_deref(), query.result_class.as_deref())
        {
            return Err(err);
        }
        Ok(state
            .associated(object, query)
            .into_iter()
            .map(|i| i.path)
            .collect())
    }

    async fn references(
        &self,
        object: &CimInstanceName,
        query: &AssociationQuery,
    ) -> Result<Vec<CimInstance>> {
        let mut state = self.state();
        state.calls.push(Call::References {
            object: object.clone(),
            query: query.clone(),
        });
        if let Some(err) = state.association_failure(query.result_class.as_deref(), None) {
            return Err(err);
        }
        let mut indices: Vec<usize> = state
            .links(object, query.result_class.as_deref(), query.role.as_deref())
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        indices.dedup();
        Ok(indices.into_iter().map(|i| state.read(i)).collect())
    }

    async fn get_instance(
        &self,
        name: &CimInstanceName,
        _property_list: Option<&[&str]>,
    ) -> Result<CimInstance> {
        let mut state = self.state();
        state.calls.push(Call::GetInstance { name: name.clone() });
        match state.position(name) {
            Some(index) => Ok(state.read(index)),
            None => Err(Self::not_found(name)),
        }
    }

    async fn invoke_method(
        &self,
        method: &str,
        object: &CimInstanceName,
        params: MethodParams,
    ) -> Result<MethodResult> {
        let mut state = self.state();
        state.calls.push(Call::InvokeMethod {
            method: method.to_string(),
            object: object.clone(),
            params,
        });
        debug!(method, object = %object, "mock invoke_method");
        state
            .methods
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(WbemError::cim(
                    CimStatus::MethodNotAvailable,
                    format!("no scripted result for {}", method),
                ))
            })
    }

    async fn delete_instance(&self, name: &CimInstanceName) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteInstance { name: name.clone() });
        match state.position(name) {
            Some(index) => {
                state.instances.remove(index);
                Ok(())
            }
            None => Err(Self::not_found(name)),
        }
    }
}
