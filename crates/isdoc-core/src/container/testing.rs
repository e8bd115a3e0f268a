//! Synthetic PDF fixtures for container tests.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use md5::{Digest, Md5};

/// Password padding of the standard security handler.
const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const FILE_ID: &[u8] = b"isdoc-fixture-id";

/// Minimal ISDOC invoice whose `ID` is `id`.
pub(crate) fn invoice_xml(id: &str) -> String {
    format!(
        r#"<Invoice xmlns="http://isdoc.cz/namespace/2013" version="6.0.2"><ID>{}</ID><LocalCurrencyCode>CZK</LocalCurrencyCode></Invoice>"#,
        id
    )
}

/// Builds small PDFs with attachments, text and loose streams.
pub(crate) struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    pages: Vec<ObjectId>,
    embedded: Vec<(String, ObjectId)>,
    kids: bool,
}

impl PdfBuilder {
    pub(crate) fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            doc,
            pages_id,
            font_id,
            pages: Vec::new(),
            embedded: Vec::new(),
            kids: false,
        }
    }

    pub(crate) fn blank_page(mut self) -> Self {
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        self.pages.push(page_id);
        self
    }

    /// A page showing `text` as a single line in Helvetica.
    pub(crate) fn page_text(mut self, text: &str) -> Self {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![20.into(), 800.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => self.font_id },
            },
        });
        self.pages.push(page_id);
        self
    }

    /// An embedded file listed in the catalog name tree.
    pub(crate) fn global_attachment(mut self, name: &str, data: &[u8]) -> Self {
        let spec_id = self.add_filespec(name, data);
        self.embedded.push((name.to_string(), spec_id));
        self
    }

    /// A file attachment annotation on the last page.
    pub(crate) fn page_attachment(mut self, name: &str, data: &[u8]) -> Self {
        let spec_id = self.add_filespec(name, data);
        let annot_id = self.doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "FileAttachment",
            "Rect" => vec![0.into(), 0.into(), 16.into(), 16.into()],
            "FS" => spec_id,
            "Contents" => Object::string_literal(name),
        });
        let page_id = *self.pages.last().expect("page_attachment needs a page");
        if let Ok(Object::Dictionary(page)) = self.doc.get_object_mut(page_id) {
            page.set("Annots", vec![Object::Reference(annot_id)]);
        }
        self
    }

    /// A file spec that no name tree or annotation refers to.
    pub(crate) fn orphan_filespec(mut self, name: &str, data: &[u8]) -> Self {
        self.add_filespec(name, data);
        self
    }

    /// A Flate-compressed stream object not referenced from anywhere.
    pub(crate) fn compressed_stream(mut self, data: &[u8]) -> Self {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let deflated = encoder.finish().unwrap();
        self.doc
            .add_object(Stream::new(dictionary! { "Filter" => "FlateDecode" }, deflated));
        self
    }

    /// Put the name tree leaves under a `/Kids` node instead of inline.
    pub(crate) fn name_tree_kids(mut self) -> Self {
        self.kids = true;
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        save(self.finish())
    }

    /// Build with the standard security handler (RC4, 40-bit key, revision 2)
    /// and the given user password. Stream contents are encrypted.
    pub(crate) fn build_encrypted(self, user_password: &str) -> Vec<u8> {
        let mut doc = self.finish();
        let owner = PASSWORD_PAD.to_vec();
        let permissions: i32 = -4;

        let mut seed = padded_password(user_password.as_bytes());
        seed.extend_from_slice(&owner);
        seed.extend_from_slice(&(permissions as u32).to_le_bytes());
        seed.extend_from_slice(FILE_ID);
        let key = Md5::digest(&seed)[..5].to_vec();

        for (id, object) in doc.objects.iter_mut() {
            if let Object::Stream(stream) = object {
                let mut object_key = key.clone();
                object_key.extend_from_slice(&id.0.to_le_bytes()[..3]);
                object_key.extend_from_slice(&id.1.to_le_bytes()[..2]);
                let digest = Md5::digest(&object_key);
                let encrypted = rc4(&digest[..10], &stream.content);
                stream.set_content(encrypted);
            }
        }

        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "Length" => 40,
            "P" => permissions,
            "O" => Object::String(owner, StringFormat::Hexadecimal),
            "U" => Object::String(rc4(&key, &PASSWORD_PAD), StringFormat::Hexadecimal),
            "CF" => dictionary! { "StdCF" => dictionary! { "CFM" => "V2" } },
        });
        doc.trailer.set("Encrypt", encrypt_id);
        doc.trailer.set(
            "ID",
            vec![
                Object::String(FILE_ID.to_vec(), StringFormat::Hexadecimal),
                Object::String(FILE_ID.to_vec(), StringFormat::Hexadecimal),
            ],
        );

        save(doc)
    }

    fn finish(mut self) -> Document {
        let kids: Vec<Object> = self.pages.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };

        if !self.embedded.is_empty() {
            let pairs: Vec<Object> = self
                .embedded
                .iter()
                .flat_map(|(name, id)| [Object::string_literal(name.as_str()), Object::Reference(*id)])
                .collect();

            let embedded_files = if self.kids {
                let leaf_id = self.doc.add_object(dictionary! { "Names" => pairs });
                dictionary! { "Kids" => vec![Object::Reference(leaf_id)] }
            } else {
                dictionary! { "Names" => pairs }
            };
            catalog.set("Names", dictionary! { "EmbeddedFiles" => embedded_files });
        }

        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", catalog_id);
        self.doc
    }

    fn add_filespec(&mut self, name: &str, data: &[u8]) -> ObjectId {
        let stream_id = self.doc.add_object(Stream::new(
            dictionary! { "Type" => "EmbeddedFile" },
            data.to_vec(),
        ));
        self.doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal(name),
            "UF" => Object::string_literal(name),
            "EF" => dictionary! { "F" => stream_id },
        })
    }
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save test PDF");
    buf
}

fn padded_password(password: &[u8]) -> Vec<u8> {
    let len = password.len().min(32);
    let mut padded = password[..len].to_vec();
    padded.extend_from_slice(&PASSWORD_PAD[..32 - len]);
    padded
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, j as usize);
    }

    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[i as usize]);
            state.swap(i as usize, j as usize);
            let k = state[i as usize].wrapping_add(state[j as usize]);
            byte ^ state[k as usize]
        })
        .collect()
}
