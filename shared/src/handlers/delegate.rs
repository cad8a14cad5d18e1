use std::{any::Any, collections::HashSet};

use log::debug;
use lockstep_serde::ByteReader;

use crate::{
    handlers::{
        args::{arg_anchors, check_arg_count, read_args, write_args, ArgSpec},
        error::HandlerError,
        handler::{
            Handled, HandlerKind, HandlerMeta, HandlerOptions, Invocation, SyncHandler, UiState,
        },
        member::validate_member_path,
    },
    protocol::ProtocolError,
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
        references::ObjectGraph,
        registry::TypeRegistry,
        sync_type::SyncType,
    },
    types::ObjectId,
    value::{Args, Value},
};

/// One captured variable of a delegate's environment.
pub struct Capture<E> {
    path: String,
    ty: SyncType,
    anchor: bool,
    get: Box<dyn Fn(&E) -> Value>,
    set: Box<dyn Fn(&mut E, Value) -> bool>,
}

impl<E: 'static> Capture<E> {
    pub fn new<V: Any>(
        path: &str,
        ty: SyncType,
        get: impl Fn(&E) -> V + 'static,
        set: impl Fn(&mut E, V) + 'static,
    ) -> Self {
        Self {
            path: path.to_string(),
            ty,
            anchor: false,
            get: Box::new(move |env: &E| Value::new(get(env))),
            set: Box::new(move |env: &mut E, mut value: Value| match value.take::<V>() {
                Some(value) => {
                    set(env, value);
                    true
                }
                None => false,
            }),
        }
    }

    /// The object held by this capture decides the command's map.
    pub fn resolve_map(mut self) -> Self {
        self.anchor = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// An environment struct that lists its own captured fields, in wire order.
pub trait CaptureSet: Default + Sized + 'static {
    fn captures() -> Vec<Capture<Self>>;
}

type Invoke<W, E> = Box<dyn Fn(&mut W, &E, Args, &Invocation)>;

/// Replicates a UI closure.
///
/// The closure's captured variables live in an explicit environment struct
/// `E`. The command carries every captured field, then the call arguments;
/// the receiver rebuilds the environment from `E::default()`.
pub struct SyncDelegate<W, E> {
    meta: HandlerMeta,
    captures: Vec<Capture<E>>,
    args: Vec<ArgSpec>,
    invoke: Invoke<W, E>,
    cancel_if_field_null: Vec<String>,
    cancel_if_no_selected: bool,
}

impl<W: ObjectGraph + 'static, E: Default + 'static> SyncDelegate<W, E> {
    /// A delegate whose captures are listed with [`SyncDelegate::capture`].
    pub fn new(name: &str, invoke: impl Fn(&mut W, &E, Args, &Invocation) + 'static) -> Self {
        Self {
            meta: HandlerMeta::new(name),
            captures: Vec::new(),
            args: Vec::new(),
            invoke: Box::new(invoke),
            cancel_if_field_null: Vec::new(),
            cancel_if_no_selected: false,
        }
    }

    pub fn capture(mut self, capture: Capture<E>) -> Self {
        self.captures.push(capture);
        self
    }

    pub fn arg(mut self, arg: impl Into<ArgSpec>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Declines the command on peers where this captured field decodes null.
    pub fn cancel_if_field_null(mut self, path: &str) -> Self {
        self.cancel_if_field_null.push(path.to_string());
        self
    }

    pub fn cancel_if_no_selected(mut self) -> Self {
        self.cancel_if_no_selected = true;
        self
    }

    pub fn captures(&self) -> impl Iterator<Item = &str> {
        self.captures.iter().map(Capture::path)
    }

    pub(crate) fn validate(&self) -> Result<(), ProtocolError> {
        validate_member_path(&self.meta.name, false)?;
        let mut seen = HashSet::new();
        for capture in &self.captures {
            validate_member_path(&capture.path, false)?;
            if !seen.insert(capture.path.as_str()) {
                return Err(ProtocolError::InvalidMemberPath {
                    path: capture.path.clone(),
                    reason: format!("captured twice by `{}`", self.meta.name),
                });
            }
        }
        for path in &self.cancel_if_field_null {
            if !seen.contains(path.as_str()) {
                return Err(ProtocolError::InvalidMemberPath {
                    path: path.clone(),
                    reason: format!("not captured by `{}`", self.meta.name),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn check_args(&self, args: &Args) -> Result<(), HandlerError> {
        check_arg_count(&self.meta.name, &self.args, args)
    }

    pub(crate) fn admit(&self, ui: &UiState) -> bool {
        if self.cancel_if_no_selected && ui.selected.is_empty() {
            debug!("{}: nothing selected, call cancelled", self.meta.name);
            return false;
        }
        true
    }

    pub(crate) fn anchors(&self, env: &E, args: &Args) -> Vec<ObjectId> {
        let mut anchors: Vec<ObjectId> = self
            .captures
            .iter()
            .filter(|capture| capture.anchor)
            .filter_map(|capture| capture.ty.object_id((capture.get)(env).as_ref()))
            .collect();
        anchors.extend(arg_anchors(&self.args, args));
        anchors
    }

    pub(crate) fn write_body(
        &self,
        ctx: &mut WriteContext<'_, W>,
        env: &E,
        args: &Args,
    ) -> Result<(), SerializationError> {
        for capture in &self.captures {
            let value = (capture.get)(env);
            ctx.write_value(&capture.ty, value.as_ref())?;
        }
        write_args(ctx, &self.args, args)
    }
}

impl<W: ObjectGraph + 'static, E: CaptureSet> SyncDelegate<W, E> {
    /// A delegate over an environment that lists its own captures.
    pub fn from_capture_set(
        name: &str,
        invoke: impl Fn(&mut W, &E, Args, &Invocation) + 'static,
    ) -> Self {
        let mut delegate = Self::new(name, invoke);
        delegate.captures = E::captures();
        delegate
    }
}

impl<W: ObjectGraph + 'static, E: Default + 'static> HandlerOptions for SyncDelegate<W, E> {
    fn options_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }
}

impl<W: ObjectGraph + 'static, E: Default + 'static> SyncHandler<W> for SyncDelegate<W, E> {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Delegate
    }

    fn handle(
        &self,
        world: &mut W,
        reader: &mut ByteReader,
        registry: &TypeRegistry<W>,
        invocation: &Invocation,
    ) -> Result<Handled, HandlerError> {
        let mut env = E::default();
        let args = {
            let mut ctx = ReadContext::new(&*world, reader, registry, invocation.map);
            for capture in &self.captures {
                let value = ctx.read_value(&capture.ty)?;
                if capture.ty.is_null_value(value.as_ref())
                    && self.cancel_if_field_null.contains(&capture.path)
                {
                    debug!(
                        "{}: captured `{}` no longer resolves, declining",
                        self.meta.name, capture.path
                    );
                    return Ok(Handled::Declined);
                }
                if !value.is_null() && !(capture.set)(&mut env, value) {
                    return Err(SerializationError::TypeMismatch {
                        type_name: capture.ty.type_name().to_string(),
                    }
                    .into());
                }
            }
            read_args(&mut ctx, &self.args)?
        };

        if self.cancel_if_no_selected && invocation.selected.is_empty() {
            debug!("{}: no selected objects left, declining", self.meta.name);
            return Ok(Handled::Declined);
        }
        (self.invoke)(world, &env, args, invocation);
        Ok(Handled::Applied)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
