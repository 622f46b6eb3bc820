//! Column x target-kind apply handlers.
//!
//! The same column means different things for different targets: `Name`
//! renames a layer but re-points a block reference at another block,
//! `CenterX` moves a circle's center but translates a line. Dispatch is a
//! table keyed by (lowercase column, kind); attribute columns dispatch by
//! prefix. A missing entry is a no-op with a diagnostic.

use rustc_hash::FxHashMap;

use crate::edit::ATTRIBUTE_PREFIX;
use crate::error::ApplyError;
use crate::record::Record;
use crate::target::{Point, TargetKind, TargetObject};
use crate::value::parse_number;

/// What a handler did
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied,
    /// Target already had this value
    Unchanged,
    /// No handler for this column on this kind
    Unsupported(String),
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Applied | ApplyOutcome::Unchanged)
    }
}

/// Everything a handler may read besides the new value
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    /// Column as spelled in the record
    pub column: &'a str,
    /// Snapshot of the record's other columns
    pub siblings: &'a Record,
}

pub type ApplyHandler = fn(&mut TargetObject, &str, &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError>;

#[derive(Clone, Default)]
pub struct HandlerTable {
    exact: FxHashMap<(String, TargetKind), ApplyHandler>,
    prefixed: Vec<(String, TargetKind, ApplyHandler)>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("exact", &self.exact.len())
            .field("prefixed", &self.prefixed.len())
            .finish()
    }
}

impl HandlerTable {
    /// Empty table; every dispatch is unsupported
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in handler set for drawing objects
    pub fn with_defaults() -> Self {
        use TargetKind::*;
        let entities = [BlockReference, Line, Circle, Text, Polyline];

        let mut table = Self::new();
        table.register_all("name", &[Layer, BlockDefinition], rename_symbol);
        table.register("name", BlockReference, set_block_name);
        table.register_all("layer", &entities, set_layer);
        table.register_all("color", &entities, set_color);
        table.register("color", Layer, set_color);
        table.register_all("linetype", &entities, set_linetype);
        table.register("linetype", Layer, set_linetype);
        table.register_all("description", &[Layer, BlockDefinition], set_description);
        table.register("frozen", Layer, set_frozen);
        table.register_all("rotation", &[BlockReference, Text], set_rotation);
        table.register_all("centerx", &[BlockReference, Text, Circle, Line], set_center_x);
        table.register_all("centery", &[BlockReference, Text, Circle, Line], set_center_y);
        table.register("radius", Circle, set_radius);
        table.register("contents", Text, set_contents);
        table.register("height", Text, set_height);
        table.register("scale", BlockReference, set_scale);
        table.register_prefix(ATTRIBUTE_PREFIX, BlockReference, set_attribute);
        table
    }

    pub fn register(&mut self, column: &str, kind: TargetKind, handler: ApplyHandler) {
        self.exact.insert((column.to_lowercase(), kind), handler);
    }

    pub fn register_all(&mut self, column: &str, kinds: &[TargetKind], handler: ApplyHandler) {
        for &kind in kinds {
            self.register(column, kind, handler);
        }
    }

    pub fn register_prefix(&mut self, prefix: &str, kind: TargetKind, handler: ApplyHandler) {
        self.prefixed.push((prefix.to_lowercase(), kind, handler));
    }

    pub fn lookup(&self, column: &str, kind: TargetKind) -> Option<ApplyHandler> {
        let key = column.to_lowercase();
        if let Some(&handler) = self.exact.get(&(key.clone(), kind)) {
            return Some(handler);
        }
        self.prefixed
            .iter()
            .find(|(prefix, k, _)| *k == kind && key.starts_with(prefix.as_str()))
            .map(|&(_, _, handler)| handler)
    }

    /// Apply one value, choosing the handler by column and target kind
    pub fn dispatch(
        &self,
        target: &mut TargetObject,
        column: &str,
        value: &str,
        siblings: &Record,
    ) -> Result<ApplyOutcome, ApplyError> {
        let kind = target.kind();
        match self.lookup(column, kind) {
            Some(handler) => handler(target, value, &ApplyContext { column, siblings }),
            None => {
                let message = format!("column '{}' cannot be applied to a {}", column, kind);
                log::warn!("{}", message);
                Ok(ApplyOutcome::Unsupported(message))
            }
        }
    }
}

fn number(value: &str, ctx: &ApplyContext<'_>) -> Result<f64, ApplyError> {
    parse_number(value).ok_or_else(|| ApplyError::InvalidNumber {
        column: ctx.column.to_string(),
        value: value.to_string(),
    })
}

fn invalid(value: &str, ctx: &ApplyContext<'_>, reason: &str) -> ApplyError {
    ApplyError::InvalidValue {
        column: ctx.column.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn assign<T: PartialEq>(slot: &mut T, value: T) -> ApplyOutcome {
    if *slot == value {
        ApplyOutcome::Unchanged
    } else {
        *slot = value;
        ApplyOutcome::Applied
    }
}

/// Symbol table names: non-empty, none of the reserved characters
fn symbol_name(value: &str, ctx: &ApplyContext<'_>) -> Result<String, ApplyError> {
    const RESERVED: &[char] = &['<', '>', '/', '\\', '"', ':', ';', '?', '*', '|', ',', '=', '`'];
    let name = value.trim();
    if name.is_empty() {
        return Err(invalid(value, ctx, "name cannot be empty"));
    }
    if let Some(c) = name.chars().find(|c| RESERVED.contains(c)) {
        return Err(invalid(value, ctx, &format!("character '{}' is not allowed", c)));
    }
    Ok(name.to_string())
}

fn mismatch(target: &TargetObject, ctx: &ApplyContext<'_>) -> ApplyError {
    ApplyError::Rejected(format!("{} handler registered for unexpected {}", ctx.column, target.kind()))
}

fn rename_symbol(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let name = symbol_name(value, ctx)?;
    match target {
        TargetObject::Layer { name: slot, .. } | TargetObject::BlockDefinition { name: slot, .. } => {
            Ok(assign(slot, name))
        }
        other => Err(mismatch(other, ctx)),
    }
}

fn set_block_name(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let name = symbol_name(value, ctx)?;
    match target {
        TargetObject::BlockReference { block_name, .. } => Ok(assign(block_name, name)),
        other => Err(mismatch(other, ctx)),
    }
}

fn set_layer(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let name = symbol_name(value, ctx)?;
    if let Some(props) = target.props_mut() {
        return Ok(assign(&mut props.layer, name));
    }
    Err(mismatch(target, ctx))
}

fn set_color(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let color = value.trim().to_string();
    if color.is_empty() {
        return Err(invalid(value, ctx, "color cannot be empty"));
    }
    if let TargetObject::Layer { color: slot, .. } = target {
        return Ok(assign(slot, color));
    }
    if let Some(props) = target.props_mut() {
        return Ok(assign(&mut props.color, color));
    }
    Err(mismatch(target, ctx))
}

fn set_linetype(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let linetype = symbol_name(value, ctx)?;
    if let TargetObject::Layer { linetype: slot, .. } = target {
        return Ok(assign(slot, linetype));
    }
    if let Some(props) = target.props_mut() {
        return Ok(assign(&mut props.linetype, linetype));
    }
    Err(mismatch(target, ctx))
}

fn set_description(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    match target {
        TargetObject::Layer { description, .. } | TargetObject::BlockDefinition { description, .. } => {
            Ok(assign(description, value.to_string()))
        }
        other => Err(mismatch(other, ctx)),
    }
}

fn set_frozen(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let frozen = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        _ => return Err(invalid(value, ctx, "expected true or false")),
    };
    match target {
        TargetObject::Layer { frozen: slot, .. } => Ok(assign(slot, frozen)),
        other => Err(mismatch(other, ctx)),
    }
}

fn set_rotation(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let degrees = number(value, ctx)?.rem_euclid(360.0);
    match target {
        TargetObject::BlockReference { rotation, .. } | TargetObject::Text { rotation, .. } => {
            Ok(assign(rotation, degrees))
        }
        other => Err(mismatch(other, ctx)),
    }
}

/// Move the object's reference point along one axis
fn move_axis(target: &mut TargetObject, coordinate: f64, axis: fn(&mut Point) -> &mut f64) -> Option<ApplyOutcome> {
    match target {
        TargetObject::BlockReference { position, .. } | TargetObject::Text { position, .. } => {
            Some(assign(axis(position), coordinate))
        }
        TargetObject::Circle { center, .. } => Some(assign(axis(center), coordinate)),
        TargetObject::Line { start, end, .. } => {
            let mid = (*axis(start) + *axis(end)) / 2.0;
            let delta = coordinate - mid;
            if delta == 0.0 {
                return Some(ApplyOutcome::Unchanged);
            }
            *axis(start) += delta;
            *axis(end) += delta;
            Some(ApplyOutcome::Applied)
        }
        _ => None,
    }
}

fn set_center_x(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let x = number(value, ctx)?;
    move_axis(target, x, |p| &mut p.x).ok_or_else(|| mismatch(target, ctx))
}

fn set_center_y(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let y = number(value, ctx)?;
    move_axis(target, y, |p| &mut p.y).ok_or_else(|| mismatch(target, ctx))
}

fn set_radius(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let r = number(value, ctx)?;
    if r <= 0.0 {
        return Err(invalid(value, ctx, "radius must be positive"));
    }
    match target {
        TargetObject::Circle { radius, .. } => Ok(assign(radius, r)),
        other => Err(mismatch(other, ctx)),
    }
}

fn set_contents(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    match target {
        TargetObject::Text { contents, .. } => Ok(assign(contents, value.to_string())),
        other => Err(mismatch(other, ctx)),
    }
}

fn set_height(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let h = number(value, ctx)?;
    if h <= 0.0 {
        return Err(invalid(value, ctx, "height must be positive"));
    }
    match target {
        TargetObject::Text { height, .. } => Ok(assign(height, h)),
        other => Err(mismatch(other, ctx)),
    }
}

fn set_scale(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let s = number(value, ctx)?;
    if s == 0.0 {
        return Err(invalid(value, ctx, "scale cannot be zero"));
    }
    match target {
        TargetObject::BlockReference { scale, .. } => Ok(assign(scale, s)),
        other => Err(mismatch(other, ctx)),
    }
}

fn set_attribute(target: &mut TargetObject, value: &str, ctx: &ApplyContext<'_>) -> Result<ApplyOutcome, ApplyError> {
    let tag = &ctx.column[ATTRIBUTE_PREFIX.len().min(ctx.column.len())..];
    match target {
        TargetObject::BlockReference { attributes, block_name, .. } => {
            let Some((_, slot)) = attributes.iter_mut().find(|(t, _)| t.eq_ignore_ascii_case(tag)) else {
                return Err(ApplyError::Rejected(format!("block '{}' has no attribute '{}'", block_name, tag)));
            };
            Ok(assign(slot, value.to_string()))
        }
        other => Err(mismatch(other, ctx)),
    }
}
