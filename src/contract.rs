//! Contract names derived from structural type descriptions
//!
//! A [TypeDescriptor] describes a type the way runtime reflection surfaces it: namespace,
//! simple name (with its generic arity suffix, e.g. ```List`1```), enclosing type, array,
//! pointer and by-reference element types, and the flat list of generic arguments.
//!
//! [type_identity] renders a descriptor with the following grammar:
//!
//! * ```namespace.Name``` for plain types, ```Outer+Inner``` for nested types
//! * ```Element[][,]``` for arrays, dimension markers in declaration order
//! * ```Element*``` for pointers and ```Element&``` for by-reference types
//! * ```Name(Arg1,Arg2)``` for closed generics, ```Name(,)``` for generic definitions
//! * ```Return(Param1,Param2)``` for invokable types, which are named after their call signature
//!
//! Names are memoized by a [ContractNameCache].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

const NAMESPACE_SEPARATOR: char = '.';
const NESTED_CLASS_SEPARATOR: char = '+';
const ARRAY_OPENING_BRACKET: char = '[';
const ARRAY_CLOSING_BRACKET: char = ']';
const ARRAY_RANK_SEPARATOR: char = ',';
const POINTER_SYMBOL: char = '*';
const BY_REF_SYMBOL: char = '&';
const GENERIC_OPENING_BRACKET: char = '(';
const GENERIC_CLOSING_BRACKET: char = ')';
const GENERIC_ARGUMENT_SEPARATOR: char = ',';
const GENERIC_ARITY_MARKER: char = '`';

/// Call signature of an invokable type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    return_type: TypeDescriptor,
    parameters: Vec<TypeDescriptor>,
}

impl Signature {
    pub fn new(return_type: TypeDescriptor, parameters: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self {
            return_type,
            parameters: parameters.into_iter().collect(),
        }
    }

    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    pub fn parameters(&self) -> &[TypeDescriptor] {
        &self.parameters
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeShape {
    Named {
        namespace: String,
        name: String,
        declaring: Option<TypeDescriptor>,
        arguments: Vec<TypeDescriptor>,
        definition: bool,
        invoke: Option<Signature>,
        is_abstract: bool,
    },
    Array {
        element: TypeDescriptor,
        rank: usize,
    },
    Pointer(TypeDescriptor),
    ByRef(TypeDescriptor),
}

/// Structural description of a type.
///
/// Descriptors are cheap to clone and compare structurally.
/// The `with_*` builders only copy the underlying node while it is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor(Arc<TypeShape>);

impl TypeDescriptor {
    /// A plain named type. An empty namespace denotes the global namespace.
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self(Arc::new(TypeShape::Named {
            namespace: namespace.into(),
            name: name.into(),
            declaring: None,
            arguments: Vec::new(),
            definition: false,
            invoke: None,
            is_abstract: false,
        }))
    }

    /// A generic type parameter, e.g. the ```T``` of ```List`1```
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::named("", name)
    }

    /// Declare the enclosing type of a nested type.
    ///
    /// A nested type lives in the namespace of its enclosing type, which replaces its own.
    pub fn nested_in(mut self, declaring: TypeDescriptor) -> Self {
        if let TypeShape::Named { namespace, declaring: d, .. } = Arc::make_mut(&mut self.0) {
            *namespace = declaring.namespace().to_string();
            *d = Some(declaring);
        }
        self
    }

    /// Set the generic arguments, including those inherited from enclosing generic types
    pub fn with_generic_arguments(mut self, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        if let TypeShape::Named { arguments, .. } = Arc::make_mut(&mut self.0) {
            *arguments = args.into_iter().collect();
        }
        self
    }

    /// Mark a generic type as an unbound definition
    pub fn as_definition(mut self) -> Self {
        if let TypeShape::Named { definition, .. } = Arc::make_mut(&mut self.0) {
            *definition = true;
        }
        self
    }

    /// Attach the call signature of an invokable type
    pub fn invokable(mut self, signature: Signature) -> Self {
        if let TypeShape::Named { invoke, .. } = Arc::make_mut(&mut self.0) {
            *invoke = Some(signature);
        }
        self
    }

    pub fn as_abstract(mut self) -> Self {
        if let TypeShape::Named { is_abstract, .. } = Arc::make_mut(&mut self.0) {
            *is_abstract = true;
        }
        self
    }

    /// An array of this type with the given rank (```T[]``` has rank 1, ```T[,]``` rank 2)
    pub fn make_array(self, rank: usize) -> Self {
        assert!(rank > 0, "array rank must be positive");
        Self(Arc::new(TypeShape::Array { element: self, rank }))
    }

    pub fn make_pointer(self) -> Self {
        Self(Arc::new(TypeShape::Pointer(self)))
    }

    pub fn make_by_ref(self) -> Self {
        Self(Arc::new(TypeShape::ByRef(self)))
    }

    /// Namespace of the type; arrays, pointers and references use their element's namespace
    pub fn namespace(&self) -> &str {
        match &*self.0 {
            TypeShape::Named { namespace, .. } => namespace,
            TypeShape::Array { element, .. } | TypeShape::Pointer(element) | TypeShape::ByRef(element) => {
                element.namespace()
            }
        }
    }

    pub fn declaring_type(&self) -> Option<&TypeDescriptor> {
        match &*self.0 {
            TypeShape::Named { declaring, .. } => declaring.as_ref(),
            _ => None,
        }
    }

    pub fn generic_arguments(&self) -> &[TypeDescriptor] {
        match &*self.0 {
            TypeShape::Named { arguments, .. } => arguments,
            _ => &[],
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_arguments().is_empty()
    }

    pub fn is_generic_definition(&self) -> bool {
        matches!(&*self.0, TypeShape::Named { definition: true, .. }) && self.is_generic()
    }

    /// The call signature of a non-abstract invokable type
    pub fn invocation(&self) -> Option<&Signature> {
        match &*self.0 {
            TypeShape::Named {
                invoke: Some(signature),
                is_abstract: false,
                ..
            } => Some(signature),
            _ => None,
        }
    }

    /// Follow array element types down to the first non-array type
    fn root_element(&self) -> &TypeDescriptor {
        let mut current = self;
        while let TypeShape::Array { element, .. } = &*current.0 {
            current = element;
        }
        current
    }
}

/// Canonical identity of a contract
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractName(Arc<str>);

impl ContractName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if two names share the same allocation (i.e. come from the same cache entry)
    pub fn ptr_eq(&self, other: &ContractName) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ContractName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContractName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ContractName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Render the canonical identity of a type.
///
/// # Panics
///
/// Panics if the descriptor is malformed, i.e. its generic arguments do not
/// match the arity of its enclosing generic types.
pub fn type_identity(ty: &TypeDescriptor) -> String {
    let mut out = String::new();
    match ty.invocation() {
        Some(signature) => write_method_identity(&mut out, signature),
        None => write_type_with_namespace(&mut out, ty),
    }
    out
}

fn write_method_identity(out: &mut String, signature: &Signature) {
    write_type_with_namespace(out, signature.return_type());
    out.push(GENERIC_OPENING_BRACKET);
    for (i, parameter) in signature.parameters().iter().enumerate() {
        if i > 0 {
            out.push(GENERIC_ARGUMENT_SEPARATOR);
        }
        write_type_with_namespace(out, parameter);
    }
    out.push(GENERIC_CLOSING_BRACKET);
}

fn write_type_with_namespace(out: &mut String, ty: &TypeDescriptor) {
    let namespace = ty.namespace();
    if !namespace.is_empty() {
        out.push_str(namespace);
        out.push(NAMESPACE_SEPARATOR);
    }
    write_type(out, ty);
}

fn write_type(out: &mut String, ty: &TypeDescriptor) {
    if ty.is_generic() {
        write_generic_type(out, ty);
    } else {
        write_non_generic_type(out, ty);
    }
}

fn write_non_generic_type(out: &mut String, ty: &TypeDescriptor) {
    if let Some(declaring) = ty.declaring_type() {
        write_type(out, declaring);
        out.push(NESTED_CLASS_SEPARATOR);
    }
    match &*ty.0 {
        TypeShape::Named { name, .. } => out.push_str(name),
        TypeShape::Array { .. } => write_array_type(out, ty),
        TypeShape::Pointer(element) => {
            write_type(out, element);
            out.push(POINTER_SYMBOL);
        }
        TypeShape::ByRef(element) => {
            write_type(out, element);
            out.push(BY_REF_SYMBOL);
        }
    }
}

fn write_array_type(out: &mut String, ty: &TypeDescriptor) {
    write_type(out, ty.root_element());
    let mut current = ty;
    while let TypeShape::Array { element, rank } = &*current.0 {
        out.push(ARRAY_OPENING_BRACKET);
        for _ in 1..*rank {
            out.push(ARRAY_RANK_SEPARATOR);
        }
        out.push(ARRAY_CLOSING_BRACKET);
        current = element;
    }
}

fn write_generic_type(out: &mut String, ty: &TypeDescriptor) {
    let mut queue: VecDeque<&TypeDescriptor> = ty.generic_arguments().iter().collect();
    write_generic_type_name(out, ty, ty.is_generic_definition(), &mut queue);
}

fn write_generic_type_name(
    out: &mut String,
    ty: &TypeDescriptor,
    is_definition: bool,
    queue: &mut VecDeque<&TypeDescriptor>,
) {
    let mut arity = ty.generic_arguments().len();
    if let Some(declaring) = ty.declaring_type() {
        if declaring.is_generic() {
            write_generic_type_name(out, declaring, is_definition, queue);
            let inherited = declaring.generic_arguments().len();
            arity = match arity.checked_sub(inherited) {
                Some(own) => own,
                None => panic!(
                    "malformed type descriptor: nested type declares {arity} generic arguments, fewer than the {inherited} of its enclosing type"
                ),
            };
        } else {
            write_non_generic_type(out, declaring);
        }
        out.push(NESTED_CLASS_SEPARATOR);
    }

    let TypeShape::Named { name, .. } = &*ty.0 else {
        unreachable!("only named types carry generic arguments");
    };
    out.push_str(generic_type_name(name, arity));
    write_type_arguments(out, arity, is_definition, queue);
}

/// Strip the arity suffix from the name of a generic level
fn generic_type_name(name: &str, arity: usize) -> &str {
    if arity == 0 {
        return name;
    }
    match name.find(GENERIC_ARITY_MARKER) {
        Some(pos) => &name[..pos],
        None => name,
    }
}

fn write_type_arguments(out: &mut String, arity: usize, is_definition: bool, queue: &mut VecDeque<&TypeDescriptor>) {
    if arity == 0 {
        return;
    }
    out.push(GENERIC_OPENING_BRACKET);
    for i in 0..arity {
        let Some(argument) = queue.pop_front() else {
            panic!("malformed type descriptor: generic argument queue exhausted while rendering '{out}'");
        };
        if i > 0 {
            out.push(GENERIC_ARGUMENT_SEPARATOR);
        }
        if !is_definition {
            write_type_with_namespace(out, argument);
        }
    }
    out.push(GENERIC_CLOSING_BRACKET);
}

/// Memoized contract names.
///
/// Names are computed outside of the lock; when two threads race on the same
/// descriptor, the first inserted name wins and is returned to both.
#[derive(Default)]
pub struct ContractNameCache {
    names: RwLock<HashMap<TypeDescriptor, ContractName>>,
}

impl ContractNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain the contract name of a type, computing and storing it if needed
    pub fn contract_name(&self, ty: &TypeDescriptor) -> ContractName {
        if let Some(name) = self.names.read().get(ty) {
            return name.clone();
        }

        let computed = ContractName::new(type_identity(ty));
        let mut names = self.names.write();
        let name = names.entry(ty.clone()).or_insert_with(|| {
            trace!(contract = %computed, "cached contract name");
            computed
        });
        name.clone()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

impl fmt::Debug for ContractNameCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractNameCache").field("len", &self.len()).finish()
    }
}
