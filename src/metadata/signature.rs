//! Normalized method signatures.
//!
//! A normalized signature identifies a method within one scan pass and appears verbatim
//! in violation reports:
//!
//! ```text
//! DeclaringType.Name(Param1,Param2)<Generic1,Generic2>
//! ```
//!
//! The generic suffix is omitted for non-generic methods. Parameters and generic arguments
//! are rendered by simple type name, so two overloads whose parameter types share a simple
//! name but live in different namespaces produce the same signature.

use crate::metadata::descriptor::MethodDescriptor;

/// Render the normalized signature of `method`.
#[must_use]
pub fn normalize(method: &MethodDescriptor) -> String {
    normalize_parts(
        &method.declaring_type,
        &method.name,
        &method.parameters,
        &method.generic_arguments,
    )
}

/// Render a normalized signature from its parts.
#[must_use]
pub fn normalize_parts<P, G>(
    declaring_type: &str,
    name: &str,
    parameters: &[P],
    generic_arguments: &[G],
) -> String
where
    P: AsRef<str>,
    G: AsRef<str>,
{
    let mut signature = format!(
        "{declaring_type}.{name}({})",
        join(parameters.iter().map(AsRef::as_ref))
    );

    if !generic_arguments.is_empty() {
        signature.push('<');
        signature.push_str(&join(generic_arguments.iter().map(AsRef::as_ref)));
        signature.push('>');
    }

    signature
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(",")
}
