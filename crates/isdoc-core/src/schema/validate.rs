//! Instance validation against a loaded [`Schema`].

use roxmltree::Node;
use tracing::{debug, trace};

use super::content::{match_children, Binding, Mismatch};
use super::model::{
    AttributeSet, AttributeUse, ComplexType, Content, Derivation, ElementDecl, Particle, ProcessContents,
    QName, Resolved, Schema, TypeRef, Variety, Wildcard, XSI_NAMESPACE,
};
use super::types::{Builtin, WhiteSpace};
use crate::xml::DocumentTree;

const MAX_DERIVATION_DEPTH: usize = 64;

/// Content model and attributes of a complex type after following its
/// derivation chain.
struct Effective<'s> {
    mixed: bool,
    content: EffectiveContent<'s>,
    attributes: Vec<&'s AttributeUse>,
    wildcard: Option<&'s Wildcard>,
}

enum EffectiveContent<'s> {
    /// Particles matched as one sequence; empty means no children allowed.
    Elements(Vec<&'s Particle>),
    Simple(&'s TypeRef),
}

impl Schema {
    /// Validate a document, returning the first violation found.
    pub fn validate(&self, tree: &DocumentTree<'_>) -> Result<(), String> {
        let validator = Validator { schema: self, tree };
        let root = tree.root();
        let name = element_name(root);

        match self.element(&name) {
            Some(decl) => validator.element(root, decl),
            None => Err(validator.fail(
                root,
                "No matching global declaration available for the validation root.",
            )),
        }
    }
}

struct Validator<'s, 't, 'input> {
    schema: &'s Schema,
    tree: &'t DocumentTree<'input>,
}

impl<'s> Validator<'s, '_, '_> {
    fn fail(&self, node: Node<'_, '_>, message: &str) -> String {
        let line = self.tree.document().text_pos_at(node.range().start).row;
        format!("Element '{}': {} (line {})", element_name(node), message, line)
    }

    fn element(&self, node: Node<'_, '_>, decl: &ElementDecl) -> Result<(), String> {
        trace!("Validating element {}", decl.name);

        if node.attribute((XSI_NAMESPACE, "nil")) == Some("true") {
            if !decl.nillable {
                return Err(self.fail(node, "The element is not nillable."));
            }
            if node.children().any(|c| c.is_element() || (c.is_text() && !text_is_blank(c))) {
                return Err(self.fail(node, "The element cannot have content, because it is nilled."));
            }
            return Ok(());
        }

        match &decl.type_ref {
            Some(type_ref) => self.typed(node, type_ref),
            None => Ok(()),
        }
    }

    fn typed(&self, node: Node<'_, '_>, type_ref: &TypeRef) -> Result<(), String> {
        match self.schema.resolve(type_ref) {
            Resolved::Builtin(Builtin::AnyType) => Ok(()),
            Resolved::Builtin(_) | Resolved::Simple(_) => self.simple_element(node, type_ref),
            Resolved::Complex(complex) => self.complex_element(node, complex),
            Resolved::Missing(name) => {
                debug!("Type {} is not declared, skipping {}", name, element_name(node));
                Ok(())
            }
        }
    }

    fn simple_element(&self, node: Node<'_, '_>, type_ref: &TypeRef) -> Result<(), String> {
        if node.children().any(|c| c.is_element()) {
            return Err(self.fail(
                node,
                "Element content is not allowed, because the type definition is simple.",
            ));
        }
        if let Some(attribute) = node
            .attributes()
            .find(|a| a.namespace() != Some(XSI_NAMESPACE))
        {
            return Err(self.fail(
                node,
                &format!("The attribute '{}' is not allowed.", attribute_name(&attribute)),
            ));
        }
        self.simple_value(&initial_value(node), type_ref)
            .map_err(|e| self.fail(node, &format!("{}.", e)))
    }

    fn complex_element(&self, node: Node<'_, '_>, complex: &'s ComplexType) -> Result<(), String> {
        let effective = self.effective(complex, 0);
        self.attributes(node, &effective)?;

        match effective.content {
            EffectiveContent::Simple(type_ref) => {
                if node.children().any(|c| c.is_element()) {
                    return Err(self.fail(
                        node,
                        "Element content is not allowed, because the content type is a simple type definition.",
                    ));
                }
                self.simple_value(&initial_value(node), type_ref)
                    .map_err(|e| self.fail(node, &format!("{}.", e)))
            }
            EffectiveContent::Elements(particles) => {
                if !effective.mixed
                    && node.children().any(|c| c.is_text() && !text_is_blank(c))
                {
                    let kind = if particles.is_empty() { "empty" } else { "element-only" };
                    return Err(self.fail(
                        node,
                        &format!(
                            "Character content other than whitespace is not allowed because the content type is '{}'.",
                            kind
                        ),
                    ));
                }

                let children: Vec<Node<'_, '_>> = node.children().filter(|c| c.is_element()).collect();
                let names: Vec<QName> = children.iter().map(|c| element_name(*c)).collect();

                let bindings = match_children(self.schema, &particles, &names)
                    .map_err(|mismatch| self.mismatch(node, &children, mismatch))?;

                for (child, binding) in children.iter().zip(bindings) {
                    self.bound(*child, binding)?;
                }
                Ok(())
            }
        }
    }

    fn bound(&self, node: Node<'_, '_>, binding: Binding<'_>) -> Result<(), String> {
        match binding {
            Binding::Element(decl) => self.element(node, decl),
            Binding::Unchecked => Ok(()),
            Binding::Wildcard(wildcard) => {
                let name = element_name(node);
                match (wildcard.process, self.schema.element(&name)) {
                    (ProcessContents::Skip, _) => Ok(()),
                    (_, Some(decl)) => self.element(node, decl),
                    (ProcessContents::Lax, None) => Ok(()),
                    (ProcessContents::Strict, None) if self.schema.is_lax(name.namespace.as_deref()) => Ok(()),
                    (ProcessContents::Strict, None) => Err(self.fail(
                        node,
                        "No matching global element declaration available, but demanded by the strict wildcard.",
                    )),
                }
            }
        }
    }

    fn mismatch(&self, parent: Node<'_, '_>, children: &[Node<'_, '_>], mismatch: Mismatch) -> String {
        match mismatch {
            Mismatch::Unexpected { index, expected } => {
                let child = children[index];
                let message = match expected_list(&expected) {
                    Some(list) => format!("This element is not expected. Expected is {}.", list),
                    None => "This element is not expected.".to_string(),
                };
                self.fail(child, &message)
            }
            Mismatch::Incomplete { expected } => {
                let message = match expected_list(&expected) {
                    Some(list) => format!("Missing child element(s). Expected is {}.", list),
                    None => "Missing child element(s).".to_string(),
                };
                self.fail(parent, &message)
            }
        }
    }

    fn attributes(&self, node: Node<'_, '_>, effective: &Effective<'s>) -> Result<(), String> {
        for attribute in node.attributes() {
            if attribute.namespace() == Some(XSI_NAMESPACE) {
                continue;
            }

            let declared = effective
                .attributes
                .iter()
                .copied()
                .find(|u| u.name.matches(attribute.namespace(), attribute.name()));

            let type_ref = match declared {
                Some(attribute_use) => self.attribute_type(attribute_use),
                None => {
                    let name = QName::new(attribute.namespace(), attribute.name());
                    let allowed = effective
                        .wildcard
                        .filter(|w| w.allows(attribute.namespace()));
                    match allowed {
                        None => {
                            return Err(self.fail(
                                node,
                                &format!("The attribute '{}' is not allowed.", attribute_name(&attribute)),
                            ))
                        }
                        Some(w) if w.process == ProcessContents::Skip => None,
                        Some(w) => match self.schema.attribute(&name) {
                            Some(global) => global.type_ref.as_ref(),
                            None if w.process == ProcessContents::Strict
                                && !self.schema.is_lax(attribute.namespace()) =>
                            {
                                return Err(self.fail(
                                    node,
                                    &format!(
                                        "The attribute '{}': No matching global attribute declaration available, but demanded by the strict wildcard.",
                                        attribute_name(&attribute)
                                    ),
                                ))
                            }
                            None => None,
                        },
                    }
                }
            };

            if let Some(type_ref) = type_ref {
                self.simple_value(attribute.value(), type_ref).map_err(|e| {
                    self.fail(node, &format!("The attribute '{}': {}.", attribute_name(&attribute), e))
                })?;
            }
        }

        for required in effective.attributes.iter().filter(|u| u.required) {
            let present = node
                .attributes()
                .any(|a| required.name.matches(a.namespace(), a.name()));
            if !present {
                return Err(self.fail(
                    node,
                    &format!("The attribute '{}' is required but missing.", required.name),
                ));
            }
        }

        Ok(())
    }

    fn attribute_type(&self, attribute_use: &'s AttributeUse) -> Option<&'s TypeRef> {
        if attribute_use.is_ref {
            self.schema
                .attribute(&attribute_use.name)
                .and_then(|global| global.type_ref.as_ref())
        } else {
            attribute_use.type_ref.as_ref()
        }
    }

    fn effective(&self, complex: &'s ComplexType, depth: usize) -> Effective<'s> {
        let base = complex
            .base
            .as_ref()
            .filter(|_| depth < MAX_DERIVATION_DEPTH)
            .and_then(|(derivation, base)| match self.schema.resolve(base) {
                Resolved::Complex(base) => Some((*derivation, self.effective(base, depth + 1))),
                _ => None,
            });

        let content = match &complex.content {
            Content::Simple(type_ref) => EffectiveContent::Simple(type_ref),
            Content::Elements(particle) => EffectiveContent::Elements(vec![particle]),
            Content::Empty => EffectiveContent::Elements(Vec::new()),
        };

        let mut effective = Effective {
            mixed: complex.mixed,
            content,
            attributes: Vec::new(),
            wildcard: None,
        };

        // attributes are inherited through both kinds of derivation,
        // particles only through extension
        if let Some((derivation, inherited)) = base {
            if let (
                Derivation::Extension,
                EffectiveContent::Elements(inherited_particles),
                EffectiveContent::Elements(own),
            ) = (derivation, inherited.content, &mut effective.content)
            {
                let mut particles = inherited_particles;
                particles.append(own);
                *own = particles;
            }
            effective.attributes = inherited.attributes;
            effective.wildcard = inherited.wildcard;
        }

        self.collect_attributes(&complex.attributes, &mut effective, 0);
        effective.attributes.retain(|u| !u.prohibited);
        effective
    }

    fn collect_attributes(&self, set: &'s AttributeSet, effective: &mut Effective<'s>, depth: usize) {
        for attribute_use in &set.uses {
            effective.attributes.retain(|u| u.name != attribute_use.name);
            effective.attributes.push(attribute_use);
        }
        if set.wildcard.is_some() {
            effective.wildcard = set.wildcard.as_ref();
        }
        if depth >= MAX_DERIVATION_DEPTH {
            return;
        }
        for name in &set.groups {
            match self.schema.attribute_group(name) {
                Some(group) => self.collect_attributes(group, effective, depth + 1),
                None => debug!("Attribute group {} is not declared", name),
            }
        }
    }

    /// Check a simple value, normalizing white space first.
    fn simple_value(&self, value: &str, type_ref: &TypeRef) -> Result<(), String> {
        let normalized = self.white_space(type_ref, 0).normalize(value);
        self.lexical(&normalized, type_ref, 0)
    }

    fn lexical(&self, value: &str, type_ref: &TypeRef, depth: usize) -> Result<(), String> {
        if depth >= MAX_DERIVATION_DEPTH {
            return Ok(());
        }
        match self.schema.resolve(type_ref) {
            Resolved::Builtin(builtin) => builtin.check(value),
            Resolved::Missing(_) => Ok(()),
            Resolved::Complex(complex) => match &complex.content {
                Content::Simple(inner) => self.lexical(value, inner, depth + 1),
                _ => Ok(()),
            },
            Resolved::Simple(simple) => match &simple.variety {
                Variety::Restriction(base) => {
                    self.lexical(value, base, depth + 1)?;
                    simple.facets.check(value, self.primitive(base, depth + 1), None)
                }
                Variety::List(item) => {
                    for token in value.split_whitespace() {
                        self.lexical(token, item, depth + 1)?;
                    }
                    let items = value.split_whitespace().count();
                    simple.facets.check(value, Builtin::String, Some(items))
                }
                Variety::Union(members) => {
                    if members.iter().any(|m| self.simple_value(value, m).is_ok()) {
                        simple.facets.check(value, Builtin::String, None)
                    } else {
                        Err(format!("'{}' is not a valid value of the union type", value))
                    }
                }
            },
        }
    }

    /// Built-in type at the bottom of a restriction chain.
    fn primitive(&self, type_ref: &TypeRef, depth: usize) -> Builtin {
        if depth >= MAX_DERIVATION_DEPTH {
            return Builtin::AnySimpleType;
        }
        match self.schema.resolve(type_ref) {
            Resolved::Builtin(builtin) => builtin,
            Resolved::Simple(simple) => match &simple.variety {
                Variety::Restriction(base) => self.primitive(base, depth + 1),
                _ => Builtin::String,
            },
            Resolved::Complex(complex) => match &complex.content {
                Content::Simple(inner) => self.primitive(inner, depth + 1),
                _ => Builtin::AnySimpleType,
            },
            Resolved::Missing(_) => Builtin::AnySimpleType,
        }
    }

    fn white_space(&self, type_ref: &TypeRef, depth: usize) -> WhiteSpace {
        if depth >= MAX_DERIVATION_DEPTH {
            return WhiteSpace::Preserve;
        }
        match self.schema.resolve(type_ref) {
            Resolved::Builtin(builtin) => builtin.white_space(),
            Resolved::Simple(simple) => match (&simple.variety, simple.facets.white_space) {
                (_, Some(white_space)) => white_space,
                (Variety::Restriction(base), None) => self.white_space(base, depth + 1),
                (Variety::List(_), None) => WhiteSpace::Collapse,
                (Variety::Union(_), None) => WhiteSpace::Preserve,
            },
            Resolved::Complex(complex) => match &complex.content {
                Content::Simple(inner) => self.white_space(inner, depth + 1),
                _ => WhiteSpace::Preserve,
            },
            Resolved::Missing(_) => WhiteSpace::Preserve,
        }
    }
}

fn element_name(node: Node<'_, '_>) -> QName {
    QName::new(node.tag_name().namespace(), node.tag_name().name())
}

fn attribute_name(attribute: &roxmltree::Attribute<'_, '_>) -> String {
    QName::new(attribute.namespace(), attribute.name()).to_string()
}

/// Concatenated text children.
fn initial_value(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect()
}

fn text_is_blank(node: Node<'_, '_>) -> bool {
    node.text().is_none_or(|t| t.trim().is_empty())
}

fn expected_list(expected: &[String]) -> Option<String> {
    match expected {
        [] => None,
        [single] => Some(format!("( {} )", single)),
        many => Some(format!("one of ( {} )", many.join(", "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns="http://isdoc.cz/namespace/2013"
        targetNamespace="http://isdoc.cz/namespace/2013"
        elementFormDefault="qualified">
      <xs:element name="Invoice">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="ID" type="IdType"/>
            <xs:element name="IssueDate" type="xs:date"/>
            <xs:element name="Note" type="xs:string" minOccurs="0"/>
            <xs:element name="LegalMonetaryTotal" type="TotalType"/>
            <xs:any namespace="##other" processContents="lax" minOccurs="0"/>
          </xs:sequence>
          <xs:attribute name="version" use="required">
            <xs:simpleType>
              <xs:restriction base="xs:string">
                <xs:enumeration value="6.0.1"/>
                <xs:enumeration value="6.0.2"/>
              </xs:restriction>
            </xs:simpleType>
          </xs:attribute>
        </xs:complexType>
      </xs:element>
      <xs:simpleType name="IdType">
        <xs:restriction base="xs:string">
          <xs:minLength value="1"/>
          <xs:pattern value="[A-Z]{2}-\d+"/>
        </xs:restriction>
      </xs:simpleType>
      <xs:complexType name="AmountType">
        <xs:simpleContent>
          <xs:extension base="xs:decimal">
            <xs:attribute name="currencyID" type="xs:string"/>
          </xs:extension>
        </xs:simpleContent>
      </xs:complexType>
      <xs:complexType name="BaseTotal">
        <xs:sequence>
          <xs:element name="TaxExclusiveAmount" type="AmountType"/>
        </xs:sequence>
      </xs:complexType>
      <xs:complexType name="TotalType">
        <xs:complexContent>
          <xs:extension base="BaseTotal">
            <xs:sequence>
              <xs:element name="PayableAmount" type="AmountType"/>
            </xs:sequence>
          </xs:extension>
        </xs:complexContent>
      </xs:complexType>
    </xs:schema>"###;

    fn check(xml: &str) -> Result<(), String> {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let tree = DocumentTree::parse(xml).unwrap();
        schema.validate(&tree)
    }

    fn invoice(body: &str) -> String {
        format!(
            r#"<Invoice xmlns="http://isdoc.cz/namespace/2013" version="6.0.2">{}</Invoice>"#,
            body
        )
    }

    const TOTAL: &str = "<LegalMonetaryTotal><TaxExclusiveAmount>100.00</TaxExclusiveAmount>\
                         <PayableAmount currencyID=\"CZK\">121.00</PayableAmount></LegalMonetaryTotal>";

    #[test]
    fn test_valid_document() {
        let xml = invoice(&format!(
            "<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate><Note> hi </Note>{}",
            TOTAL
        ));
        assert_eq!(check(&xml), Ok(()));
    }

    #[test]
    fn test_foreign_element_allowed_by_wildcard() {
        let xml = invoice(&format!(
            "<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate>{}<ext:Sig xmlns:ext=\"urn:ext\"><ext:Any/></ext:Sig>",
            TOTAL
        ));
        assert_eq!(check(&xml), Ok(()));
    }

    #[test]
    fn test_unexpected_element() {
        let xml = invoice(&format!("<ID>FV-1</ID><Bogus/><IssueDate>2024-03-01</IssueDate>{}", TOTAL));
        let err = check(&xml).unwrap_err();
        assert!(err.starts_with("Element '{http://isdoc.cz/namespace/2013}Bogus': This element is not expected."));
        assert!(err.contains("{http://isdoc.cz/namespace/2013}IssueDate"));
    }

    #[test]
    fn test_missing_required_child() {
        let xml = invoice("<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate>");
        let err = check(&xml).unwrap_err();
        assert!(err.contains("Missing child element(s)"));
        assert!(err.contains("LegalMonetaryTotal"));
    }

    #[test]
    fn test_extension_requires_base_content_first() {
        let xml = invoice(
            "<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate>\
             <LegalMonetaryTotal><PayableAmount>1</PayableAmount></LegalMonetaryTotal>",
        );
        let err = check(&xml).unwrap_err();
        assert!(err.contains("PayableAmount': This element is not expected"));
    }

    #[test]
    fn test_simple_type_mismatch() {
        let xml = invoice(&format!("<ID>FV-1</ID><IssueDate>1. 3. 2024</IssueDate>{}", TOTAL));
        let err = check(&xml).unwrap_err();
        assert!(err.contains("is not a valid value of the atomic type 'xs:date'"));

        let xml = invoice(&format!("<ID>fv1</ID><IssueDate>2024-03-01</IssueDate>{}", TOTAL));
        assert!(check(&xml).unwrap_err().contains("pattern"));
    }

    #[test]
    fn test_simple_content_value_checked() {
        let total = "<LegalMonetaryTotal><TaxExclusiveAmount>sto</TaxExclusiveAmount>\
                     <PayableAmount>1</PayableAmount></LegalMonetaryTotal>";
        let xml = invoice(&format!("<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate>{}", total));
        assert!(check(&xml).unwrap_err().contains("xs:decimal"));
    }

    #[test]
    fn test_attribute_rules() {
        let body = format!("<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate>{}", TOTAL);

        let missing = format!(r#"<Invoice xmlns="http://isdoc.cz/namespace/2013">{}</Invoice>"#, body);
        assert!(check(&missing).unwrap_err().contains("The attribute 'version' is required but missing"));

        let wrong = format!(r#"<Invoice xmlns="http://isdoc.cz/namespace/2013" version="5.2">{}</Invoice>"#, body);
        assert!(check(&wrong).unwrap_err().contains("not an element of the set"));

        let extra = format!(
            r#"<Invoice xmlns="http://isdoc.cz/namespace/2013" version="6.0.2" foo="1">{}</Invoice>"#,
            body
        );
        assert!(check(&extra).unwrap_err().contains("The attribute 'foo' is not allowed"));
    }

    #[test]
    fn test_unknown_root() {
        let err = check(r#"<Order xmlns="http://isdoc.cz/namespace/2013"/>"#).unwrap_err();
        assert!(err.contains("No matching global declaration available for the validation root"));
        assert!(err.ends_with("(line 1)"));
    }

    #[test]
    fn test_character_content_in_element_only() {
        let xml = invoice(&format!("text<ID>FV-1</ID><IssueDate>2024-03-01</IssueDate>{}", TOTAL));
        assert!(check(&xml).unwrap_err().contains("element-only"));
    }
}
