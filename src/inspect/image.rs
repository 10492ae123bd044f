use std::{collections::HashMap, path::Path};

use crate::{
    assembly::{decode_method, MethodRef, TokenResolver},
    file::Image,
    inspect::BodySource,
    metadata::{
        descriptor::MethodDescriptor, method::MethodIl, streams::UserStrings, token::Token,
    },
    Result,
};

/// Reads method bodies from an on-disk module image.
///
/// The host supplies the locations it already knows from its own metadata reader: the
/// file offset of each method body keyed by normalized signature, the extent of the `#US`
/// heap, and the member references the inspector needs resolved by name.
pub struct ImageBodySource {
    image: Image,
    user_strings: Option<(usize, usize)>,
    bodies: HashMap<String, usize>,
    members: HashMap<Token, MethodRef>,
}

impl ImageBodySource {
    /// Wraps an image without any known locations
    #[must_use]
    pub fn new(image: Image) -> Self {
        ImageBodySource {
            image,
            user_strings: None,
            bodies: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Maps the module image at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or is empty.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Image::from_file(path)?))
    }

    /// Sets the file offset and size of the `#US` heap
    #[must_use]
    pub fn with_user_strings(mut self, offset: usize, size: usize) -> Self {
        self.user_strings = Some((offset, size));
        self
    }

    /// Registers the file offset of a method body
    #[must_use]
    pub fn with_body(mut self, signature: impl Into<String>, offset: usize) -> Self {
        self.bodies.insert(signature.into(), offset);
        self
    }

    /// Registers a resolved member reference
    #[must_use]
    pub fn with_member(mut self, member: MethodRef) -> Self {
        self.members.insert(member.token, member);
        self
    }
}

impl TokenResolver for ImageBodySource {
    fn user_string(&self, token: Token) -> Option<String> {
        if !token.is_user_string() {
            return None;
        }

        let (offset, size) = self.user_strings?;
        let heap = self.image.data_slice(offset, size).ok()?;
        UserStrings::from(heap).ok()?.get(token.row() as usize).ok()
    }

    fn method(&self, token: Token) -> Option<MethodRef> {
        self.members.get(&token).cloned()
    }
}

impl BodySource for ImageBodySource {
    fn read_body(&self, method: &MethodDescriptor) -> Result<Option<MethodIl>> {
        let Some(offset) = self.bodies.get(&method.signature()) else {
            return Ok(None);
        };

        let data = self.image.data_from(*offset)?;
        decode_method(data, self).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{pattern::OWNERSHIP_MARKER, BodyInspector};

    /// A fake image: padding, a tiny body and a `#US` heap holding the marker
    fn image_bytes() -> (Vec<u8>, usize, usize) {
        let mut data = vec![0xCC; 4];

        // ldstr 0x70000001, call 0x0A000002, ret
        #[rustfmt::skip]
        let code = [
            0x72, 0x01, 0x00, 0x00, 0x70,
            0x28, 0x02, 0x00, 0x00, 0x0A,
            0x2A,
        ];
        data.push(((code.len() as u8) << 2) | 0x2);
        data.extend_from_slice(&code);

        let heap_offset = data.len();
        let units = OWNERSHIP_MARKER.encode_utf16().collect::<Vec<_>>();
        let length = units.len() * 2 + 1;
        data.push(0x00);
        if length < 0x80 {
            data.push(length as u8);
        } else {
            data.push(0x80 | (length >> 8) as u8);
            data.push(length as u8);
        }
        for unit in units {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        data.push(0x00);

        let heap_size = data.len() - heap_offset;
        (data, heap_offset, heap_size)
    }

    fn handler() -> MethodDescriptor {
        MethodDescriptor::new("Game", "Foo", "__rpc_handler_1").with_parameters([
            "NetworkBehaviour",
            "FastBufferReader",
            "__RpcParams",
        ])
    }

    #[test]
    fn test_reads_and_resolves_body() {
        let (data, heap_offset, heap_size) = image_bytes();
        let source = ImageBodySource::new(Image::from_mem(data).unwrap())
            .with_user_strings(heap_offset, heap_size)
            .with_body(handler().signature(), 4)
            .with_member(MethodRef::new_static(
                Token::new(0x0A00_0002),
                "UnityEngine.Debug",
                "LogError",
                1,
            ));

        let il = source.read_body(&handler()).unwrap().unwrap();
        assert_eq!(il.instructions.len(), 3);
        assert_eq!(il.instructions[0].string_literal(), Some(OWNERSHIP_MARKER));

        let inspector = BodyInspector::default();
        assert!(inspector.contains_marker(&source, &handler()));
    }

    #[test]
    fn test_unknown_method_and_broken_body() {
        let (data, heap_offset, heap_size) = image_bytes();
        let source = ImageBodySource::new(Image::from_mem(data).unwrap())
            .with_user_strings(heap_offset, heap_size)
            .with_body("Foo.Broken()", 0);

        let missing = MethodDescriptor::new("Game", "Foo", "Missing");
        assert!(source.read_body(&missing).unwrap().is_none());

        // offset 0 points at padding, which is not a valid header
        let broken = MethodDescriptor::new("Game", "Foo", "Broken");
        assert!(source.read_body(&broken).is_err());

        let inspector = BodyInspector::default();
        assert!(!inspector.contains_marker(&source, &missing));
        assert!(!inspector.contains_marker(&source, &broken));
    }

    #[test]
    fn test_missing_file() {
        assert!(ImageBodySource::open(Path::new("/nonexistent/Assembly-CSharp.dll")).is_err());
    }
}
