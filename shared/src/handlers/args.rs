use serde::{de::DeserializeOwned, Serialize};

use crate::{
    handlers::error::HandlerError,
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
        references::ObjectGraph,
        sync_type::SyncType,
    },
    types::ObjectId,
    value::Args,
};

/// Declared type of one positional argument.
#[derive(Clone, Debug)]
pub struct ArgSpec {
    ty: SyncType,
    resolve_map: bool,
}

impl ArgSpec {
    pub fn new(ty: SyncType) -> Self {
        Self {
            ty,
            resolve_map: false,
        }
    }

    /// An argument persisted through the exposable serializer.
    pub fn exposed<T: Serialize + DeserializeOwned + 'static>() -> Self {
        Self::new(SyncType::exposed::<T>())
    }

    /// The map of this argument's object decides which partition the
    /// command runs on.
    pub fn resolve_map(mut self) -> Self {
        self.resolve_map = true;
        self
    }

    pub fn ty(&self) -> &SyncType {
        &self.ty
    }

    pub fn resolves_map(&self) -> bool {
        self.resolve_map
    }
}

impl From<SyncType> for ArgSpec {
    fn from(ty: SyncType) -> Self {
        ArgSpec::new(ty)
    }
}

pub(crate) fn check_arg_count(
    name: &str,
    specs: &[ArgSpec],
    args: &Args,
) -> Result<(), HandlerError> {
    if specs.len() == args.len() {
        Ok(())
    } else {
        Err(HandlerError::ArgumentCount {
            name: name.to_string(),
            expected: specs.len(),
            found: args.len(),
        })
    }
}

pub(crate) fn arg_anchors<'a>(
    specs: &'a [ArgSpec],
    args: &'a Args,
) -> impl Iterator<Item = ObjectId> + 'a {
    specs
        .iter()
        .enumerate()
        .filter(|(_, spec)| spec.resolve_map)
        .filter_map(|(index, spec)| spec.ty.object_id(args.value(index)))
}

pub(crate) fn write_args<W: ObjectGraph + 'static>(
    ctx: &mut WriteContext<'_, W>,
    specs: &[ArgSpec],
    args: &Args,
) -> Result<(), SerializationError> {
    for (index, spec) in specs.iter().enumerate() {
        ctx.write_value(&spec.ty, args.value(index))?;
    }
    Ok(())
}

pub(crate) fn read_args<W: ObjectGraph + 'static>(
    ctx: &mut ReadContext<'_, '_, W>,
    specs: &[ArgSpec],
) -> Result<Args, SerializationError> {
    let mut args = Args::new();
    for spec in specs {
        args.push(ctx.read_value(&spec.ty)?);
    }
    Ok(args)
}

pub(crate) fn any_arg_null(specs: &[ArgSpec], args: &Args) -> bool {
    specs
        .iter()
        .enumerate()
        .any(|(index, spec)| spec.ty.is_null_value(args.value(index)))
}
