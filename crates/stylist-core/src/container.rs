//! Typed service container populated by features during `on_config`.
//!
//! Each capability is a marker type naming its identifier and the service
//! interface it hands out. Registration stores a factory; the service is
//! built on first [`Container::get`] and shared afterwards. Factories get
//! the container itself, so a service can look up its dependencies when it
//! is built rather than when it is registered.

use crate::docker::DockerService;
use crate::error::{Result, StylistError};
use crate::kms::KmsHelper;
use crate::store::{ConfigStorage, SessionProvider};
use crate::terraform::TerraformService;
use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityId {
    Aws,
    Kms,
    ConfigSsm,
    ConfigLocal,
    Docker,
    Terraform,
    #[cfg(test)]
    Greeting,
    #[cfg(test)]
    Farewell,
}

impl CapabilityId {
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityId::Aws => "aws",
            CapabilityId::Kms => "kms",
            CapabilityId::ConfigSsm => "config.ssm",
            CapabilityId::ConfigLocal => "config.local",
            CapabilityId::Docker => "docker",
            CapabilityId::Terraform => "terraform",
            #[cfg(test)]
            CapabilityId::Greeting => "greeting",
            #[cfg(test)]
            CapabilityId::Farewell => "farewell",
        }
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Capability: 'static {
    const ID: CapabilityId;
    type Service: ?Sized + 'static;
}

pub struct Aws;
impl Capability for Aws {
    const ID: CapabilityId = CapabilityId::Aws;
    type Service = dyn SessionProvider;
}

pub struct Kms;
impl Capability for Kms {
    const ID: CapabilityId = CapabilityId::Kms;
    type Service = KmsHelper;
}

pub struct ConfigSsm;
impl Capability for ConfigSsm {
    const ID: CapabilityId = CapabilityId::ConfigSsm;
    type Service = dyn ConfigStorage;
}

pub struct ConfigLocal;
impl Capability for ConfigLocal {
    const ID: CapabilityId = CapabilityId::ConfigLocal;
    type Service = dyn ConfigStorage;
}

pub struct Docker;
impl Capability for Docker {
    const ID: CapabilityId = CapabilityId::Docker;
    type Service = DockerService;
}

pub struct Terraform;
impl Capability for Terraform {
    const ID: CapabilityId = CapabilityId::Terraform;
    type Service = TerraformService;
}

type Factory<T> = Box<dyn Fn(&Container) -> Result<Rc<T>>>;

struct Slot<T: ?Sized> {
    factory: Factory<T>,
    instance: OnceCell<Rc<T>>,
}

#[derive(Default)]
pub struct Container {
    slots: HashMap<CapabilityId, Box<dyn Any>>,
    /// Capabilities whose factory is currently running.
    building: RefCell<HashSet<CapabilityId>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lazily built singleton. Registering the same capability
    /// again replaces the earlier factory.
    pub fn register<C: Capability>(
        &mut self,
        factory: impl Fn(&Container) -> Result<Rc<C::Service>> + 'static,
    ) {
        let slot: Slot<C::Service> = Slot {
            factory: Box::new(factory),
            instance: OnceCell::new(),
        };
        if self.slots.insert(C::ID, Box::new(slot)).is_some() {
            tracing::debug!(capability = %C::ID, "replaced capability registration");
        } else {
            tracing::debug!(capability = %C::ID, "registered capability");
        }
    }

    /// Register an already built service.
    pub fn register_instance<C: Capability>(&mut self, service: Rc<C::Service>) {
        self.register::<C>(move |_| Ok(Rc::clone(&service)));
    }

    pub fn get<C: Capability>(&self) -> Result<Rc<C::Service>> {
        let slot = self
            .slots
            .get(&C::ID)
            .and_then(|s| s.downcast_ref::<Slot<C::Service>>())
            .ok_or(StylistError::CapabilityNotRegistered(C::ID.as_str()))?;

        if let Some(instance) = slot.instance.get() {
            return Ok(Rc::clone(instance));
        }
        if !self.building.borrow_mut().insert(C::ID) {
            return Err(StylistError::CapabilityCycle(C::ID.as_str()));
        }
        let built = (slot.factory)(self);
        self.building.borrow_mut().remove(&C::ID);
        let built = built?;
        Ok(Rc::clone(slot.instance.get_or_init(|| built)))
    }

    pub fn contains(&self, id: CapabilityId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn registered(&self) -> Vec<CapabilityId> {
        let mut ids: Vec<CapabilityId> = self.slots.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.registered())
            .finish()
    }
}
