//! Validation of documents against an XML Schema file.
//!
//! Only the part of XML Schema that the GPX 1.1 schema is written in is
//! compiled: global elements, named complex types built from a `sequence`
//! of elements and `any` wildcards, attributes, and named simple types that
//! restrict a built-in type with range or enumeration facets. Anything else
//! in the schema file is reported as unsupported when the schema is loaded.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{SchemaError, ValidationError};
use crate::gpxxml::{Element, Node, parse_document};
use crate::parse_gpx_time;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

const BUILTIN_TYPES: &[&str] = &[
    "string",
    "normalizedString",
    "token",
    "anyURI",
    "decimal",
    "integer",
    "nonNegativeInteger",
    "dateTime",
    "gYear",
];

#[derive(Debug, Clone)]
enum Particle {
    Element {
        name: String,
        type_name: String,
        min: u32,
        max: Option<u32>,
    },
    Any {
        other_namespace: bool,
        min: u32,
        max: Option<u32>,
    },
}

impl Particle {
    fn bounds(&self) -> (u32, Option<u32>) {
        match self {
            Particle::Element { min, max, .. } | Particle::Any { min, max, .. } => (*min, *max),
        }
    }

    fn describe(&self) -> String {
        match self {
            Particle::Element { name, .. } => format!("'{name}'"),
            Particle::Any { .. } => "an extension element".to_string(),
        }
    }

    fn accepts(&self, child: &Element, target_namespace: &str) -> bool {
        match self {
            Particle::Element { name, .. } => {
                child.local_name() == name
                    && child.namespace.as_deref() == Some(target_namespace)
            }
            Particle::Any {
                other_namespace, ..
            } => !*other_namespace || child.namespace.as_deref() != Some(target_namespace),
        }
    }
}

#[derive(Debug, Clone)]
struct AttributeDecl {
    name: String,
    type_name: String,
    required: bool,
    fixed: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ComplexType {
    particles: Vec<Particle>,
    attributes: Vec<AttributeDecl>,
}

#[derive(Debug, Clone, Default)]
struct SimpleType {
    base: String,
    min_inclusive: Option<f64>,
    max_inclusive: Option<f64>,
    min_exclusive: Option<f64>,
    max_exclusive: Option<f64>,
    enumeration: Vec<String>,
}

/// A compiled schema.
#[derive(Debug, Clone)]
pub struct Schema {
    target_namespace: String,
    roots: HashMap<String, String>,
    complex_types: HashMap<String, ComplexType>,
    simple_types: HashMap<String, SimpleType>,
}

fn local(qname: &str) -> &str {
    match qname.split_once(':') {
        Some((_, name)) => name,
        None => qname,
    }
}

fn required_attr<'a>(element: &'a Element, key: &str) -> Result<&'a str, SchemaError> {
    element.attribute(key).ok_or_else(|| {
        SchemaError::Invalid(format!(
            "<{}> without '{key}' attribute",
            element.local_name()
        ))
    })
}

fn parse_occurs(element: &Element) -> Result<(u32, Option<u32>), SchemaError> {
    let invalid = |v: &str| SchemaError::Invalid(format!("invalid occurrence bound '{v}'"));
    let min = match element.attribute("minOccurs") {
        Some(v) => v.parse().map_err(|_| invalid(v))?,
        None => 1,
    };
    let max = match element.attribute("maxOccurs") {
        Some("unbounded") => None,
        Some(v) => Some(v.parse().map_err(|_| invalid(v))?),
        None => Some(1),
    };
    Ok((min, max))
}

fn xsd_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element
        .elements()
        .filter(|e| e.namespace.as_deref() == Some(XSD_NAMESPACE))
        .filter(|e| e.local_name() != "annotation")
}

impl Schema {
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let input = fs::read(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input)
    }

    pub fn parse(input: &[u8]) -> Result<Self, SchemaError> {
        let root = parse_document(input)?;
        if root.local_name() != "schema" || root.namespace.as_deref() != Some(XSD_NAMESPACE) {
            return Err(SchemaError::Invalid(format!(
                "root element <{}> is not an XML Schema",
                root.name
            )));
        }

        let mut schema = Schema {
            target_namespace: required_attr(&root, "targetNamespace")?.to_owned(),
            roots: HashMap::new(),
            complex_types: HashMap::new(),
            simple_types: HashMap::new(),
        };

        for decl in xsd_elements(&root) {
            match decl.local_name() {
                "element" => {
                    schema.roots.insert(
                        required_attr(decl, "name")?.to_owned(),
                        required_attr(decl, "type")?.to_owned(),
                    );
                }
                "complexType" => {
                    let name = required_attr(decl, "name")?.to_owned();
                    schema.complex_types.insert(name, compile_complex(decl)?);
                }
                "simpleType" => {
                    let name = required_attr(decl, "name")?.to_owned();
                    schema.simple_types.insert(name, compile_simple(decl)?);
                }
                other => {
                    return Err(SchemaError::Invalid(format!(
                        "unsupported top-level <{other}>"
                    )));
                }
            }
        }

        schema.check_references()?;
        Ok(schema)
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    fn check_references(&self) -> Result<(), SchemaError> {
        let unresolved = |t: &str| SchemaError::Invalid(format!("unknown type '{t}'"));

        for type_name in self.roots.values() {
            if !self.is_known_type(type_name) {
                return Err(unresolved(type_name));
            }
        }
        for complex in self.complex_types.values() {
            for particle in &complex.particles {
                if let Particle::Element { type_name, .. } = particle
                    && !self.is_known_type(type_name)
                {
                    return Err(unresolved(type_name));
                }
            }
            for attr in &complex.attributes {
                if self.complex_types.contains_key(local(&attr.type_name))
                    || !self.is_known_type(&attr.type_name)
                {
                    return Err(unresolved(&attr.type_name));
                }
            }
        }
        for simple in self.simple_types.values() {
            if !BUILTIN_TYPES.contains(&local(&simple.base)) {
                return Err(unresolved(&simple.base));
            }
        }
        Ok(())
    }

    fn is_known_type(&self, type_name: &str) -> bool {
        let name = local(type_name);
        self.complex_types.contains_key(name)
            || self.simple_types.contains_key(name)
            || BUILTIN_TYPES.contains(&name)
    }

    /// Validates a whole document rooted at `root`.
    pub fn validate(&self, root: &Element) -> Result<(), ValidationError> {
        let path = format!("/{}", root.local_name());
        if root.namespace.as_deref() != Some(self.target_namespace.as_str()) {
            return Err(ValidationError {
                path,
                reason: format!(
                    "root element is not in namespace '{}'",
                    self.target_namespace
                ),
            });
        }
        let Some(type_name) = self.roots.get(root.local_name()) else {
            return Err(ValidationError {
                path,
                reason: "no matching global declaration".to_string(),
            });
        };
        self.validate_element(root, type_name, &path)
    }

    fn validate_element(
        &self,
        element: &Element,
        type_name: &str,
        path: &str,
    ) -> Result<(), ValidationError> {
        let fail = |reason: String| ValidationError {
            path: path.to_string(),
            reason,
        };

        let Some(complex) = self.complex_types.get(local(type_name)) else {
            if element.elements().next().is_some() {
                return Err(fail("child elements are not allowed here".to_string()));
            }
            self.check_attributes(element, &[], path)?;
            return self.check_value(&element.text(), type_name).map_err(fail);
        };

        self.check_attributes(element, &complex.attributes, path)?;

        let has_text = element
            .children
            .iter()
            .any(|node| matches!(node, Node::Text(t) if !t.trim().is_empty()));
        if has_text {
            return Err(fail("text content is not allowed here".to_string()));
        }

        let particles = &complex.particles;
        let mut index = 0;
        let mut count = 0;
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for child in element.elements() {
            let position = seen.entry(child.local_name()).or_default();
            *position += 1;
            let child_path = format!("{path}/{}[{}]", child.local_name(), position);

            loop {
                let Some(particle) = particles.get(index) else {
                    return Err(ValidationError {
                        path: child_path,
                        reason: "this element is not expected".to_string(),
                    });
                };
                let (min, max) = particle.bounds();
                if particle.accepts(child, &self.target_namespace)
                    && max.is_none_or(|m| count < m)
                {
                    count += 1;
                    if let Particle::Element { type_name, .. } = particle {
                        self.validate_element(child, type_name, &child_path)?;
                    }
                    break;
                }
                if count < min {
                    return Err(ValidationError {
                        path: child_path,
                        reason: format!(
                            "this element is not expected, expected {}",
                            particle.describe()
                        ),
                    });
                }
                index += 1;
                count = 0;
            }
        }

        for (i, particle) in particles.iter().enumerate().skip(index) {
            let (min, _) = particle.bounds();
            let have = if i == index { count } else { 0 };
            if have < min {
                return Err(fail(format!("missing child element {}", particle.describe())));
            }
        }

        Ok(())
    }

    fn check_attributes(
        &self,
        element: &Element,
        declared: &[AttributeDecl],
        path: &str,
    ) -> Result<(), ValidationError> {
        let fail = |reason: String| ValidationError {
            path: path.to_string(),
            reason,
        };

        for decl in declared {
            match element.attribute(&decl.name) {
                None if decl.required => {
                    return Err(fail(format!(
                        "the attribute '{}' is required but missing",
                        decl.name
                    )));
                }
                None => {}
                Some(value) => {
                    if let Some(fixed) = &decl.fixed
                        && value != fixed
                    {
                        return Err(fail(format!(
                            "the attribute '{}' must have the value '{fixed}'",
                            decl.name
                        )));
                    }
                    self.check_value(value, &decl.type_name)
                        .map_err(|reason| fail(format!("attribute '{}': {reason}", decl.name)))?;
                }
            }
        }

        // Prefixed attributes (xmlns:*, xsi:*) belong to other vocabularies
        for (key, _) in &element.attributes {
            if key == "xmlns" || key.contains(':') {
                continue;
            }
            if !declared.iter().any(|d| &d.name == key) {
                return Err(fail(format!("the attribute '{key}' is not allowed")));
            }
        }

        Ok(())
    }

    fn check_value(&self, text: &str, type_name: &str) -> Result<(), String> {
        let name = local(type_name);
        let value = text.trim();

        let Some(simple) = self.simple_types.get(name) else {
            return check_builtin(value, name);
        };

        check_builtin(value, local(&simple.base))?;

        if !simple.enumeration.is_empty() && !simple.enumeration.iter().any(|e| e == value) {
            return Err(format!(
                "'{value}' is not an element of the set {{{}}}",
                simple.enumeration.join(", ")
            ));
        }

        let has_range = simple.min_inclusive.is_some()
            || simple.max_inclusive.is_some()
            || simple.min_exclusive.is_some()
            || simple.max_exclusive.is_some();
        if has_range {
            let number: f64 = value
                .parse()
                .map_err(|_| format!("'{value}' is not a valid value of {name}"))?;
            let in_range = simple.min_inclusive.is_none_or(|m| number >= m)
                && simple.max_inclusive.is_none_or(|m| number <= m)
                && simple.min_exclusive.is_none_or(|m| number > m)
                && simple.max_exclusive.is_none_or(|m| number < m);
            if !in_range {
                return Err(format!("'{value}' is not a valid value of {name}"));
            }
        }

        Ok(())
    }
}

fn check_builtin(value: &str, builtin: &str) -> Result<(), String> {
    let valid = match builtin {
        "decimal" => is_decimal(value),
        "integer" => is_integer(value, true),
        "nonNegativeInteger" => is_integer(value, false),
        "dateTime" => parse_gpx_time(value).is_ok(),
        "gYear" => {
            let digits = value.strip_prefix('-').unwrap_or(value);
            digits.len() >= 4 && digits.bytes().all(|b| b.is_ascii_digit())
        }
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid value of the atomic type 'xs:{builtin}'"))
    }
}

fn is_integer(value: &str, signed: bool) -> bool {
    let digits = match value.strip_prefix('-') {
        Some(rest) if signed => rest,
        Some(_) => return false,
        None => value.strip_prefix('+').unwrap_or(value),
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    (!whole.is_empty() || !fraction.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

fn compile_complex(decl: &Element) -> Result<ComplexType, SchemaError> {
    let mut complex = ComplexType::default();

    for part in xsd_elements(decl) {
        match part.local_name() {
            "sequence" => {
                for item in xsd_elements(part) {
                    let (min, max) = parse_occurs(item)?;
                    let particle = match item.local_name() {
                        "element" => Particle::Element {
                            name: required_attr(item, "name")?.to_owned(),
                            type_name: required_attr(item, "type")?.to_owned(),
                            min,
                            max,
                        },
                        "any" => Particle::Any {
                            other_namespace: item.attribute("namespace") == Some("##other"),
                            min,
                            max,
                        },
                        other => {
                            return Err(SchemaError::Invalid(format!(
                                "unsupported <{other}> in sequence"
                            )));
                        }
                    };
                    complex.particles.push(particle);
                }
            }
            "attribute" => {
                complex.attributes.push(AttributeDecl {
                    name: required_attr(part, "name")?.to_owned(),
                    type_name: required_attr(part, "type")?.to_owned(),
                    required: part.attribute("use") == Some("required"),
                    fixed: part.attribute("fixed").map(str::to_owned),
                });
            }
            other => {
                return Err(SchemaError::Invalid(format!(
                    "unsupported <{other}> in complexType"
                )));
            }
        }
    }

    Ok(complex)
}

fn compile_simple(decl: &Element) -> Result<SimpleType, SchemaError> {
    let restriction = xsd_elements(decl)
        .find(|e| e.local_name() == "restriction")
        .ok_or_else(|| SchemaError::Invalid("simpleType without <restriction>".to_string()))?;

    let mut simple = SimpleType {
        base: required_attr(restriction, "base")?.to_owned(),
        ..SimpleType::default()
    };

    for facet in xsd_elements(restriction) {
        let value = required_attr(facet, "value")?;
        let bound = || {
            value
                .parse::<f64>()
                .map_err(|_| SchemaError::Invalid(format!("invalid facet value '{value}'")))
        };
        match facet.local_name() {
            "minInclusive" => simple.min_inclusive = Some(bound()?),
            "maxInclusive" => simple.max_inclusive = Some(bound()?),
            "minExclusive" => simple.min_exclusive = Some(bound()?),
            "maxExclusive" => simple.max_exclusive = Some(bound()?),
            "enumeration" => simple.enumeration.push(value.to_owned()),
            other => {
                return Err(SchemaError::Invalid(format!("unsupported facet <{other}>")));
            }
        }
    }

    Ok(simple)
}
