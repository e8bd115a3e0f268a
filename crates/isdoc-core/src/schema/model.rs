//! Owned schema components and the XSD loader.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, trace, warn};

use super::types::{Builtin, Facets};
use crate::error::SchemaError;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Expanded name of a schema component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub name: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn matches(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Reference to a type definition.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Builtin(Builtin),
    Named(QName),
    Anonymous(usize),
}

#[derive(Debug)]
pub enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

#[derive(Debug)]
pub struct SimpleType {
    pub variety: Variety,
    pub facets: Facets,
}

#[derive(Debug)]
pub enum Variety {
    /// Restriction of a base type (simple, or complex with simple content).
    Restriction(TypeRef),
    List(TypeRef),
    Union(Vec<TypeRef>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Extension,
    Restriction,
}

#[derive(Debug)]
pub enum Content {
    Empty,
    Elements(Particle),
    Simple(TypeRef),
}

#[derive(Debug)]
pub struct ComplexType {
    pub mixed: bool,
    pub base: Option<(Derivation, TypeRef)>,
    pub content: Content,
    pub attributes: AttributeSet,
}

/// Attribute uses, attribute group references and the attribute wildcard
/// declared in one place.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    pub uses: Vec<AttributeUse>,
    pub groups: Vec<QName>,
    pub wildcard: Option<Wildcard>,
}

#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub name: QName,
    /// `None` for references to global declarations and untyped attributes.
    pub type_ref: Option<TypeRef>,
    pub required: bool,
    pub prohibited: bool,
    pub is_ref: bool,
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub min: u32,
    /// `None` means unbounded.
    pub max: Option<u32>,
    pub term: Term,
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementDecl),
    ElementRef(QName),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
    Group(QName),
    Any(Wildcard),
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    /// `None` means `xs:anyType`.
    pub type_ref: Option<TypeRef>,
    pub nillable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// Any namespace except the target namespace and no namespace.
    Other(Option<String>),
    List(Vec<Option<String>>),
}

#[derive(Debug, Clone)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process: ProcessContents,
}

impl Wildcard {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match &self.namespaces {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(target) => {
                namespace.is_some() && namespace != target.as_deref()
            }
            NamespaceConstraint::List(allowed) => allowed.iter().any(|n| n.as_deref() == namespace),
        }
    }
}

/// A resolved type reference.
pub enum Resolved<'s> {
    Builtin(Builtin),
    Simple(&'s SimpleType),
    Complex(&'s ComplexType),
    Missing(QName),
}

/// A loaded XSD: global components keyed by expanded name.
#[derive(Debug, Default)]
pub struct Schema {
    elements: HashMap<QName, ElementDecl>,
    types: HashMap<QName, usize>,
    arena: Vec<TypeDef>,
    groups: HashMap<QName, Particle>,
    attribute_groups: HashMap<QName, AttributeSet>,
    attributes: HashMap<QName, AttributeUse>,
    lax_namespaces: HashSet<Option<String>>,
}

impl Schema {
    /// Load a schema file and everything it includes or imports.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let mut loader = Loader::default();
        loader.load_file(path, None)?;
        debug!(
            "Loaded schema {}: {} elements, {} named types",
            path.display(),
            loader.schema.elements.len(),
            loader.schema.types.len()
        );
        Ok(loader.schema)
    }

    /// Parse a single schema document held in memory. Relative
    /// `schemaLocation`s resolve against the working directory.
    pub fn parse_str(text: &str) -> Result<Self, SchemaError> {
        let mut loader = Loader::default();
        loader.load_text(text, None, None)?;
        Ok(loader.schema)
    }

    pub fn element(&self, name: &QName) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    pub fn group(&self, name: &QName) -> Option<&Particle> {
        self.groups.get(name)
    }

    pub fn attribute_group(&self, name: &QName) -> Option<&AttributeSet> {
        self.attribute_groups.get(name)
    }

    pub fn attribute(&self, name: &QName) -> Option<&AttributeUse> {
        self.attributes.get(name)
    }

    /// Whether components of `namespace` are validated laxly because their
    /// schema could not be loaded.
    pub fn is_lax(&self, namespace: Option<&str>) -> bool {
        self.lax_namespaces.contains(&namespace.map(str::to_string))
    }

    pub fn resolve(&self, type_ref: &TypeRef) -> Resolved<'_> {
        let index = match type_ref {
            TypeRef::Builtin(builtin) => return Resolved::Builtin(*builtin),
            TypeRef::Anonymous(index) => *index,
            TypeRef::Named(name) => match self.types.get(name) {
                Some(index) => *index,
                None => return Resolved::Missing(name.clone()),
            },
        };
        match &self.arena[index] {
            TypeDef::Simple(simple) => Resolved::Simple(simple),
            TypeDef::Complex(complex) => Resolved::Complex(complex),
        }
    }
}

/// Settings of the `xs:schema` element currently being read.
#[derive(Debug, Clone)]
struct Context {
    target: Option<String>,
    elements_qualified: bool,
    attributes_qualified: bool,
}

#[derive(Default)]
struct Loader {
    schema: Schema,
    visited: HashSet<PathBuf>,
}

impl Loader {
    fn load_file(&mut self, path: &Path, inherited_target: Option<&str>) -> Result<(), SchemaError> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.visited.insert(key) {
            return Ok(());
        }

        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.load_text(&text, path.parent(), inherited_target)
    }

    fn load_text(
        &mut self,
        text: &str,
        base_dir: Option<&Path>,
        inherited_target: Option<&str>,
    ) -> Result<(), SchemaError> {
        let document = Document::parse(text).map_err(|e| SchemaError::Parse(e.to_string()))?;
        let root = document.root_element();
        if !is_xsd(root, "schema") {
            return Err(SchemaError::Parse("root element is not xs:schema".into()));
        }

        let ctx = Context {
            target: root
                .attribute("targetNamespace")
                .or(inherited_target)
                .map(str::to_string),
            elements_qualified: root.attribute("elementFormDefault") == Some("qualified"),
            attributes_qualified: root.attribute("attributeFormDefault") == Some("qualified"),
        };

        for child in xsd_children(root) {
            match child.tag_name().name() {
                "include" | "redefine" => {
                    let location = child.attribute("schemaLocation").ok_or_else(|| {
                        SchemaError::Parse("xs:include without schemaLocation".into())
                    })?;
                    let path = locate(base_dir, location);
                    self.load_file(&path, ctx.target.as_deref())?;
                }
                "import" => self.import(child, base_dir),
                "element" => {
                    let decl = self.element_decl(child, &ctx, true);
                    self.schema.elements.insert(decl.name.clone(), decl);
                }
                "complexType" | "simpleType" => {
                    let Some(name) = child.attribute("name") else {
                        continue;
                    };
                    let def = self.type_def(child, &ctx);
                    let index = self.push(def);
                    self.schema.types.insert(QName::new(ctx.target.as_deref(), name), index);
                }
                "group" => {
                    let Some(name) = child.attribute("name") else {
                        continue;
                    };
                    let particle = xsd_children(child)
                        .find_map(|c| self.particle(c, &ctx))
                        .unwrap_or_else(empty_sequence);
                    self.schema
                        .groups
                        .insert(QName::new(ctx.target.as_deref(), name), particle);
                }
                "attributeGroup" => {
                    let Some(name) = child.attribute("name") else {
                        continue;
                    };
                    let set = self.attribute_set(child, &ctx);
                    self.schema
                        .attribute_groups
                        .insert(QName::new(ctx.target.as_deref(), name), set);
                }
                "attribute" => {
                    let attribute = self.attribute_use(child, &ctx, true);
                    self.schema.attributes.insert(attribute.name.clone(), attribute);
                }
                other => trace!("Skipping top-level xs:{}", other),
            }
        }

        Ok(())
    }

    fn import(&mut self, node: Node<'_, '_>, base_dir: Option<&Path>) {
        let namespace = node.attribute("namespace");
        let Some(location) = node.attribute("schemaLocation") else {
            if namespace != Some(XML_NAMESPACE) {
                debug!("Import of {:?} has no schemaLocation, validating it laxly", namespace);
                self.schema.lax_namespaces.insert(namespace.map(str::to_string));
            }
            return;
        };

        let path = locate(base_dir, location);
        if let Err(e) = self.load_file(&path, None) {
            warn!("Skipping import {}: {}", path.display(), e);
            self.schema.lax_namespaces.insert(namespace.map(str::to_string));
        }
    }

    fn push(&mut self, def: TypeDef) -> usize {
        self.schema.arena.push(def);
        self.schema.arena.len() - 1
    }

    fn anonymous(&mut self, def: TypeDef) -> TypeRef {
        TypeRef::Anonymous(self.push(def))
    }

    fn element_decl(&mut self, node: Node<'_, '_>, ctx: &Context, global: bool) -> ElementDecl {
        let name = node.attribute("name").unwrap_or_default();
        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => ctx.elements_qualified,
        };
        let namespace = if global || qualified {
            ctx.target.as_deref()
        } else {
            None
        };

        let type_ref = match node.attribute("type") {
            Some(value) => Some(type_ref(node, value)),
            None => xsd_children(node)
                .find(|c| matches!(c.tag_name().name(), "complexType" | "simpleType"))
                .map(|c| {
                    let def = self.type_def(c, ctx);
                    self.anonymous(def)
                }),
        };

        ElementDecl {
            name: QName::new(namespace, name),
            type_ref,
            nillable: node.attribute("nillable") == Some("true"),
        }
    }

    fn type_def(&mut self, node: Node<'_, '_>, ctx: &Context) -> TypeDef {
        if node.tag_name().name() == "simpleType" {
            TypeDef::Simple(self.simple_type(node, ctx))
        } else {
            TypeDef::Complex(self.complex_type(node, ctx))
        }
    }

    fn simple_type(&mut self, node: Node<'_, '_>, ctx: &Context) -> SimpleType {
        for child in xsd_children(node) {
            match child.tag_name().name() {
                "restriction" => {
                    let base = self.base_or_inline(child, "base", ctx);
                    return SimpleType {
                        variety: Variety::Restriction(base),
                        facets: facets(child),
                    };
                }
                "list" => {
                    let item = self.base_or_inline(child, "itemType", ctx);
                    return SimpleType {
                        variety: Variety::List(item),
                        facets: Facets::default(),
                    };
                }
                "union" => {
                    let mut members: Vec<TypeRef> = child
                        .attribute("memberTypes")
                        .unwrap_or_default()
                        .split_whitespace()
                        .map(|value| type_ref(child, value))
                        .collect();
                    for inline in xsd_children(child).filter(|c| is_xsd(*c, "simpleType")) {
                        let def = TypeDef::Simple(self.simple_type(inline, ctx));
                        members.push(self.anonymous(def));
                    }
                    return SimpleType {
                        variety: Variety::Union(members),
                        facets: Facets::default(),
                    };
                }
                _ => {}
            }
        }

        SimpleType {
            variety: Variety::Restriction(TypeRef::Builtin(Builtin::AnySimpleType)),
            facets: Facets::default(),
        }
    }

    /// Type named by `attribute`, or the inline `xs:simpleType` child.
    fn base_or_inline(&mut self, node: Node<'_, '_>, attribute: &str, ctx: &Context) -> TypeRef {
        if let Some(value) = node.attribute(attribute) {
            return type_ref(node, value);
        }
        match xsd_children(node).find(|c| is_xsd(*c, "simpleType")) {
            Some(inline) => {
                let def = TypeDef::Simple(self.simple_type(inline, ctx));
                self.anonymous(def)
            }
            None => TypeRef::Builtin(Builtin::AnySimpleType),
        }
    }

    fn complex_type(&mut self, node: Node<'_, '_>, ctx: &Context) -> ComplexType {
        let mut mixed = node.attribute("mixed") == Some("true");

        for child in xsd_children(node) {
            match child.tag_name().name() {
                "simpleContent" => {
                    let Some(derivation) = xsd_children(child).next() else {
                        break;
                    };
                    let base = derivation
                        .attribute("base")
                        .map(|value| type_ref(derivation, value))
                        .unwrap_or(TypeRef::Builtin(Builtin::AnySimpleType));
                    let attributes = self.attribute_set(derivation, ctx);

                    if derivation.tag_name().name() == "restriction" {
                        let value_type = self.anonymous(TypeDef::Simple(SimpleType {
                            variety: Variety::Restriction(base.clone()),
                            facets: facets(derivation),
                        }));
                        return ComplexType {
                            mixed: false,
                            base: Some((Derivation::Restriction, base)),
                            content: Content::Simple(value_type),
                            attributes,
                        };
                    }
                    return ComplexType {
                        mixed: false,
                        base: Some((Derivation::Extension, base.clone())),
                        content: Content::Simple(base),
                        attributes,
                    };
                }
                "complexContent" => {
                    if let Some(value) = child.attribute("mixed") {
                        mixed = value == "true";
                    }
                    let Some(derivation) = xsd_children(child).next() else {
                        break;
                    };
                    let kind = if derivation.tag_name().name() == "extension" {
                        Derivation::Extension
                    } else {
                        Derivation::Restriction
                    };
                    let base = derivation
                        .attribute("base")
                        .map(|value| type_ref(derivation, value))
                        .unwrap_or(TypeRef::Builtin(Builtin::AnyType));
                    let content = self.particle_content(derivation, ctx);
                    let attributes = self.attribute_set(derivation, ctx);
                    return ComplexType {
                        mixed,
                        base: Some((kind, base)),
                        content,
                        attributes,
                    };
                }
                _ => {}
            }
        }

        let content = self.particle_content(node, ctx);
        let attributes = self.attribute_set(node, ctx);
        ComplexType {
            mixed,
            base: None,
            content,
            attributes,
        }
    }

    fn particle_content(&mut self, node: Node<'_, '_>, ctx: &Context) -> Content {
        xsd_children(node)
            .find_map(|c| self.particle(c, ctx))
            .map(Content::Elements)
            .unwrap_or(Content::Empty)
    }

    /// Parse a particle-bearing child; `None` for anything else.
    fn particle(&mut self, node: Node<'_, '_>, ctx: &Context) -> Option<Particle> {
        let term = match node.tag_name().name() {
            "element" => match node.attribute("ref") {
                Some(value) => Term::ElementRef(qname(node, value)),
                None => Term::Element(self.element_decl(node, ctx, false)),
            },
            "sequence" | "choice" | "all" => {
                let particles = xsd_children(node)
                    .filter_map(|c| self.particle(c, ctx))
                    .collect();
                match node.tag_name().name() {
                    "sequence" => Term::Sequence(particles),
                    "choice" => Term::Choice(particles),
                    _ => Term::All(particles),
                }
            }
            "group" => Term::Group(qname(node, node.attribute("ref")?)),
            "any" => Term::Any(wildcard(node, ctx)),
            _ => return None,
        };

        let min = node
            .attribute("minOccurs")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1);
        let max = match node.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => None,
            Some(value) => Some(value.parse().unwrap_or(1)),
            None => Some(1),
        };

        Some(Particle { min, max, term })
    }

    fn attribute_set(&mut self, node: Node<'_, '_>, ctx: &Context) -> AttributeSet {
        let mut set = AttributeSet::default();
        for child in xsd_children(node) {
            match child.tag_name().name() {
                "attribute" => set.uses.push(self.attribute_use(child, ctx, false)),
                "attributeGroup" => {
                    if let Some(value) = child.attribute("ref") {
                        set.groups.push(qname(child, value));
                    }
                }
                "anyAttribute" => set.wildcard = Some(wildcard(child, ctx)),
                _ => {}
            }
        }
        set
    }

    fn attribute_use(&mut self, node: Node<'_, '_>, ctx: &Context, global: bool) -> AttributeUse {
        let usage = node.attribute("use").unwrap_or("optional");

        if let Some(value) = node.attribute("ref") {
            return AttributeUse {
                name: qname(node, value),
                type_ref: None,
                required: usage == "required",
                prohibited: usage == "prohibited",
                is_ref: true,
            };
        }

        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => ctx.attributes_qualified,
        };
        let namespace = if global || qualified {
            ctx.target.as_deref()
        } else {
            None
        };

        let type_ref = match node.attribute("type") {
            Some(value) => Some(type_ref(node, value)),
            None => xsd_children(node).find(|c| is_xsd(*c, "simpleType")).map(|c| {
                let def = TypeDef::Simple(self.simple_type(c, ctx));
                self.anonymous(def)
            }),
        };

        AttributeUse {
            name: QName::new(namespace, node.attribute("name").unwrap_or_default()),
            type_ref,
            required: usage == "required",
            prohibited: usage == "prohibited",
            is_ref: false,
        }
    }
}

fn is_xsd(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(XSD_NAMESPACE)
        && node.tag_name().name() == name
}

/// XSD element children, without annotations.
fn xsd_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|c| {
        c.is_element()
            && c.tag_name().namespace() == Some(XSD_NAMESPACE)
            && c.tag_name().name() != "annotation"
    })
}

/// Resolve a prefixed name against the namespace bindings in scope.
fn qname(node: Node<'_, '_>, value: &str) -> QName {
    let value = value.trim();
    match value.split_once(':') {
        Some((prefix, local)) => QName::new(node.lookup_namespace_uri(Some(prefix)), local),
        None => QName::new(node.lookup_namespace_uri(None), value),
    }
}

fn type_ref(node: Node<'_, '_>, value: &str) -> TypeRef {
    let name = qname(node, value);
    if name.namespace.as_deref() == Some(XSD_NAMESPACE) {
        return TypeRef::Builtin(Builtin::from_name(&name.name).unwrap_or_else(|| {
            warn!("Unknown built-in type xs:{}, treating it as anySimpleType", name.name);
            Builtin::AnySimpleType
        }));
    }
    TypeRef::Named(name)
}

fn facets(node: Node<'_, '_>) -> Facets {
    let mut facets = Facets::default();
    for child in xsd_children(node) {
        if let Some(value) = child.attribute("value") {
            facets.add(child.tag_name().name(), value);
        }
    }
    facets
}

fn wildcard(node: Node<'_, '_>, ctx: &Context) -> Wildcard {
    let namespaces = match node.attribute("namespace").map(str::trim) {
        None | Some("##any") => NamespaceConstraint::Any,
        Some("##other") => NamespaceConstraint::Other(ctx.target.clone()),
        Some(list) => NamespaceConstraint::List(
            list.split_whitespace()
                .map(|item| match item {
                    "##targetNamespace" => ctx.target.clone(),
                    "##local" => None,
                    uri => Some(uri.to_string()),
                })
                .collect(),
        ),
    };
    let process = match node.attribute("processContents") {
        Some("lax") => ProcessContents::Lax,
        Some("skip") => ProcessContents::Skip,
        _ => ProcessContents::Strict,
    };
    Wildcard {
        namespaces,
        process,
    }
}

fn locate(base_dir: Option<&Path>, location: &str) -> PathBuf {
    match base_dir {
        Some(dir) => dir.join(location),
        None => PathBuf::from(location),
    }
}

fn empty_sequence() -> Particle {
    Particle {
        min: 1,
        max: Some(1),
        term: Term::Sequence(Vec::new()),
    }
}
