use getset::Getters;
use gwc_api::constants::DEFAULT_NAMESPACE;
use kube::{Resource, ResourceExt};
use std::fmt::{Display, Formatter, Write};
use thiserror::Error;
use typed_builder::TypedBuilder;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ObjectRefError {
    #[error("Object is missing a name")]
    MissingName,
}

/// The (kind, namespace, name) identity of a unit of reconciliation work.
#[derive(TypedBuilder, Getters, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    #[getset(get = "pub")]
    #[builder(setter(into))]
    kind: String,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    group: Option<String>,

    #[getset(get = "pub")]
    #[builder(setter(into))]
    namespace: String,

    #[getset(get = "pub")]
    #[builder(setter(into))]
    name: String,
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())?;
        if let Some(group) = self.group() {
            f.write_char('.')?;
            f.write_str(group)?;
        }
        f.write_char('/')?;
        f.write_str(self.namespace())?;
        f.write_char('/')?;
        f.write_str(self.name())
    }
}

impl ObjectRef {
    pub fn of_kind<K: Resource>(namespace: impl Into<String>, name: impl Into<String>) -> Self
    where
        K::DynamicType: Default,
    {
        let dynamic_type = K::DynamicType::default();
        let group = K::group(&dynamic_type);

        ObjectRef::builder()
            .kind(K::kind(&dynamic_type))
            .group((!group.is_empty()).then(|| group.to_string()))
            .namespace(namespace)
            .name(name)
            .build()
    }

    /// Objects without a namespace are treated as living in `default`.
    pub fn for_object<K: Resource + ResourceExt>(object: &K) -> Result<Self, ObjectRefError>
    where
        K::DynamicType: Default,
    {
        let name = object
            .meta()
            .name
            .clone()
            .ok_or(ObjectRefError::MissingName)?;
        let namespace = object
            .namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        Ok(Self::of_kind::<K>(namespace, name))
    }

    /// Same object, addressed as a different kind. Used where a derived object
    /// mirrors its owner's identity.
    pub fn with_kind<K: Resource>(&self) -> Self
    where
        K::DynamicType: Default,
    {
        Self::of_kind::<K>(self.namespace.clone(), self.name.clone())
    }
}
