//! Reflection-level descriptions of modules, types, methods and custom attributes.
//!
//! These are the values the host's reflection facility hands to the discovery engine.
//! They carry names rather than handles so the scanner can run against any host, and
//! against in-memory fixtures in tests.

use std::{fmt, path::PathBuf};

use crate::metadata::{signature, token::Token};

/// A loaded code module (assembly)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDescriptor {
    /// Simple assembly name, e.g. `Assembly-CSharp`
    pub name: String,
    /// Location of the image on disk, if the module was loaded from a file
    pub path: Option<PathBuf>,
}

impl ModuleDescriptor {
    /// A module without a known on-disk location
    pub fn new(name: impl Into<String>) -> Self {
        ModuleDescriptor {
            name: name.into(),
            path: None,
        }
    }

    /// Sets the on-disk location of the module image
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A type defined by a module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    /// Name of the defining module
    pub module: String,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
}

impl TypeDescriptor {
    /// Creates a type descriptor
    pub fn new(
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeDescriptor {
            module: module.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace-qualified name, as reflection renders it
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Identity of a method as seen through reflection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Name of the defining module
    pub module: String,
    /// Namespace-qualified name of the declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Simple names of the parameter types, in declaration order
    pub parameters: Vec<String>,
    /// Simple names of the generic arguments, empty for non-generic methods
    pub generic_arguments: Vec<String>,
    /// `MethodDef` token inside the defining module, null if unknown
    pub token: Token,
}

impl MethodDescriptor {
    /// A parameterless, non-generic method
    pub fn new(
        module: impl Into<String>,
        declaring_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        MethodDescriptor {
            module: module.into(),
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameters: Vec::new(),
            generic_arguments: Vec::new(),
            token: Token::new(0),
        }
    }

    /// Sets the parameter type names
    #[must_use]
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the generic argument type names
    #[must_use]
    pub fn with_generic_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `MethodDef` token
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// The normalized signature, see [`signature::normalize`]
    #[must_use]
    pub fn signature(&self) -> String {
        signature::normalize(self)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Value of a custom attribute argument
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Signed 32-bit integer
    I4(i32),
    /// String value
    String(String),
    /// Enum value with its underlying integer
    Enum(String, i32),
}

/// A named field or property assignment of a custom attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Whether this is a field (true) or property (false)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Value of the argument
    pub value: CustomAttributeArgument,
}

/// A custom attribute applied to a method
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// Simple or namespace-qualified attribute type name
    pub type_name: String,
    /// Fixed arguments from the constructor signature
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named arguments (fields and properties)
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttribute {
    /// An attribute without arguments
    pub fn new(type_name: impl Into<String>) -> Self {
        CustomAttribute {
            type_name: type_name.into(),
            fixed_args: Vec::new(),
            named_args: Vec::new(),
        }
    }

    /// Adds a named field assignment
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: CustomAttributeArgument) -> Self {
        self.named_args.push(CustomAttributeNamedArgument {
            is_field: true,
            name: name.into(),
            value,
        });
        self
    }

    /// True if the attribute type is `type_name`, compared on simple or qualified name
    #[must_use]
    pub fn is(&self, type_name: &str) -> bool {
        self.type_name == type_name
            || self
                .type_name
                .rsplit_once('.')
                .is_some_and(|(_, simple)| simple == type_name)
    }

    /// Value of a boolean named argument, `None` if it is absent or not a boolean
    #[must_use]
    pub fn named_bool(&self, name: &str) -> Option<bool> {
        self.named_args
            .iter()
            .rev()
            .find(|arg| arg.name == name)
            .and_then(|arg| match arg.value {
                CustomAttributeArgument::Bool(value) => Some(value),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_full_name() {
        assert_eq!(TypeDescriptor::new("m", "", "Foo").full_name(), "Foo");
        assert_eq!(
            TypeDescriptor::new("m", "Game.Items", "Foo").full_name(),
            "Game.Items.Foo"
        );
    }

    #[test]
    fn test_attribute_lookup() {
        let attr = CustomAttribute::new("Unity.Netcode.ServerRpcAttribute")
            .with_field("RequireOwnership", CustomAttributeArgument::Bool(false))
            .with_field("Delivery", CustomAttributeArgument::Enum("RpcDelivery".into(), 0));

        assert!(attr.is("ServerRpcAttribute"));
        assert!(attr.is("Unity.Netcode.ServerRpcAttribute"));
        assert!(!attr.is("ClientRpcAttribute"));
        assert_eq!(attr.named_bool("RequireOwnership"), Some(false));
        assert_eq!(attr.named_bool("Delivery"), None);
        assert_eq!(attr.named_bool("Missing"), None);
    }
}
