//! Computation descriptors.
//!
//! An [`Expr`] is a small, immutable tree that describes "call this function
//! with these captured values" without running it. The cache walks it to
//! derive a lookup key when the caller does not supply one.
//!
//! # Example
//!
//! ```
//! use anime_cache::expression::{Expr, Method};
//! use serde_json::json;
//!
//! // () => anime_service.get_by_id(42)
//! let descriptor = Expr::lambda(Expr::call(
//!     Expr::constant(json!("anime_service")),
//!     Method::asynchronous("AnimeService", "get_by_id"),
//!     vec![Expr::constant(42)],
//! ));
//!
//! assert_eq!(
//!     descriptor.to_string(),
//!     "() => \"anime_service\".get_by_id(42)"
//! );
//! ```

use crate::error::Result;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A compiled, directly invokable form of an opaque fragment.
pub type Invokable = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

type Compiler = Box<dyn Fn() -> Invokable + Send + Sync>;

static NEXT_FRAGMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an opaque fragment, assigned once at construction.
///
/// Clones of a descriptor share their fragments and therefore their ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(u64);

impl FragmentId {
    fn next() -> Self {
        FragmentId(NEXT_FRAGMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A descriptor fragment the evaluator cannot walk.
///
/// It can only be turned into a value by compiling it and invoking the
/// result. Compilation is assumed to be expensive; see
/// [`CompiledFragments`](crate::compiled::CompiledFragments).
pub struct Fragment {
    id: FragmentId,
    label: String,
    returns_async: bool,
    compiler: Compiler,
}

impl Fragment {
    pub fn id(&self) -> FragmentId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether invoking the fragment would yield a pending async computation.
    pub fn returns_async(&self) -> bool {
        self.returns_async
    }

    pub(crate) fn compile(&self) -> Invokable {
        (self.compiler)()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("returns_async", &self.returns_async)
            .finish_non_exhaustive()
    }
}

/// Owner of static members (members read without an instance).
pub trait StaticOwner: Send + Sync {
    /// Name used in textual renderings.
    fn type_name(&self) -> &str;

    /// Read a static member, `None` if the owner has no such member.
    fn member(&self, name: &str) -> Option<Value>;
}

/// [`StaticOwner`] backed by a fixed member table.
#[derive(Debug, Clone)]
pub struct StaticType {
    name: String,
    members: Map<String, Value>,
}

impl StaticType {
    pub fn new(name: impl Into<String>) -> Self {
        StaticType {
            name: name.into(),
            members: Map::new(),
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), value.into());
        self
    }
}

impl StaticOwner for StaticType {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.members.get(name).cloned()
    }
}

/// Container a member is read from.
#[derive(Clone)]
pub enum Owner {
    /// Member of the value another descriptor evaluates to.
    Instance(Box<Expr>),
    /// Static member.
    Static(Arc<dyn StaticOwner>),
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Instance(expr) => f.debug_tuple("Instance").field(expr).finish(),
            Owner::Static(owner) => f.debug_tuple("Static").field(&owner.type_name()).finish(),
        }
    }
}

/// Identity of a called method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    declaring_type: String,
    name: String,
    returns_async: bool,
}

impl Method {
    /// A method returning a plain value.
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Method {
            declaring_type: declaring_type.into(),
            name: name.into(),
            returns_async: false,
        }
    }

    /// A method returning an asynchronous computation.
    pub fn asynchronous(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Method {
            returns_async: true,
            ..Method::new(declaring_type, name)
        }
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn returns_async(&self) -> bool {
        self.returns_async
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

/// Computation descriptor.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Zero-argument lambda wrapping a body.
    Lambda(Box<Expr>),
    /// Literal value.
    Constant(Value),
    /// Named member read off an owner.
    Member { owner: Owner, member: String },
    /// `test ? if_true : if_false`
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Method call; `target` is `None` for static calls.
    Call {
        target: Option<Box<Expr>>,
        method: Method,
        args: Vec<Expr>,
    },
    /// Anything else, evaluated only by compilation.
    Opaque(Arc<Fragment>),
}

impl Expr {
    pub fn lambda(body: Expr) -> Self {
        Expr::Lambda(Box::new(body))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn member(owner: Expr, member: impl Into<String>) -> Self {
        Expr::Member {
            owner: Owner::Instance(Box::new(owner)),
            member: member.into(),
        }
    }

    pub fn static_member(owner: Arc<dyn StaticOwner>, member: impl Into<String>) -> Self {
        Expr::Member {
            owner: Owner::Static(owner),
            member: member.into(),
        }
    }

    /// A value captured from the enclosing scope: `{name: value}.name`.
    pub fn captured(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let mut scope = Map::new();
        scope.insert(name.clone(), value.into());
        Expr::member(Expr::Constant(Value::Object(scope)), name)
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn call(target: Expr, method: Method, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: Some(Box::new(target)),
            method,
            args,
        }
    }

    pub fn static_call(method: Method, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: None,
            method,
            args,
        }
    }

    /// Opaque fragment with an explicit compiler.
    ///
    /// `compiler` runs at most once per fragment per
    /// [`CompiledFragments`](crate::compiled::CompiledFragments) instance.
    pub fn opaque<C>(label: impl Into<String>, compiler: C) -> Self
    where
        C: Fn() -> Invokable + Send + Sync + 'static,
    {
        Expr::Opaque(Arc::new(Fragment {
            id: FragmentId::next(),
            label: label.into(),
            returns_async: false,
            compiler: Box::new(compiler),
        }))
    }

    /// Opaque fragment whose compiled form is `f` itself.
    pub fn opaque_fn<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        let invokable: Invokable = Arc::new(f);
        Expr::opaque(label, move || Arc::clone(&invokable))
    }

    /// Opaque fragment producing an asynchronous computation.
    ///
    /// It is never compiled; the evaluator uses its label instead.
    pub fn opaque_async(label: impl Into<String>) -> Self {
        Expr::Opaque(Arc::new(Fragment {
            id: FragmentId::next(),
            label: label.into(),
            returns_async: true,
            compiler: Box::new(|| -> Invokable { Arc::new(|| Ok(Value::Null)) }),
        }))
    }

    /// The descriptor with any enclosing lambdas stripped.
    pub fn body(&self) -> &Expr {
        match self {
            Expr::Lambda(body) => body.body(),
            other => other,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lambda(body) => write!(f, "() => {}", body),
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::Member {
                owner: Owner::Instance(owner),
                member,
            } => write!(f, "{}.{}", owner, member),
            Expr::Member {
                owner: Owner::Static(owner),
                member,
            } => write!(f, "{}.{}", owner.type_name(), member),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", test, if_true, if_false),
            Expr::Call {
                target,
                method,
                args,
            } => {
                match target {
                    Some(target) => write!(f, "{}.{}(", target, method.name())?,
                    None => write!(f, "{}(", method)?,
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Opaque(fragment) => f.write_str(fragment.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_call_with_captured_argument() {
        let expr = Expr::lambda(Expr::call(
            Expr::constant("repo"),
            Method::asynchronous("AnimeRepository", "find"),
            vec![Expr::captured("id", 7)],
        ));

        assert_eq!(
            expr.to_string(),
            "() => \"repo\".find({\"id\":7}.id)"
        );
    }

    #[test]
    fn test_render_static_member_and_conditional() {
        let paging: Arc<dyn StaticOwner> =
            Arc::new(StaticType::new("Paging").with_member("default_size", 20));
        let expr = Expr::conditional(
            Expr::constant(true),
            Expr::static_member(paging, "default_size"),
            Expr::constant(json!(null)),
        );

        assert_eq!(expr.to_string(), "(true ? Paging.default_size : null)");
    }

    #[test]
    fn test_render_static_call_and_opaque() {
        let expr = Expr::static_call(
            Method::new("Genres", "list"),
            vec![Expr::opaque_async("load_page()"), Expr::constant("asc")],
        );
        assert_eq!(expr.to_string(), "Genres.list(load_page(), \"asc\")");
    }

    #[test]
    fn test_fragment_ids_are_unique_and_shared_by_clones() {
        let a = Expr::opaque_fn("a", || Ok(json!(1)));
        let b = Expr::opaque_fn("a", || Ok(json!(1)));
        let a2 = a.clone();

        let id = |e: &Expr| match e {
            Expr::Opaque(fragment) => fragment.id(),
            _ => panic!("expected opaque"),
        };

        assert_ne!(id(&a), id(&b));
        assert_eq!(id(&a), id(&a2));
    }

    #[test]
    fn test_body_strips_lambdas() {
        let expr = Expr::lambda(Expr::lambda(Expr::constant(3)));
        assert!(matches!(expr.body(), Expr::Constant(v) if *v == json!(3)));
    }

    #[test]
    fn test_method_identity() {
        let method = Method::asynchronous("ReviewService", "list_for_anime");
        assert!(method.returns_async());
        assert_eq!(method.declaring_type(), "ReviewService");
        assert_eq!(method.name(), "list_for_anime");
        assert_eq!(method.to_string(), "ReviewService.list_for_anime");
        assert!(!Method::new("A", "b").returns_async());
    }
}
