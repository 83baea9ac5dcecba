//! Serialization of the scheduled work graph and the project topology
//! it references.
//!
//! The emitted project-path sequence is closed under ancestry and
//! ordered ancestor-before-descendant, so the reading side can
//! materialize each project assuming its parent already exists. Each
//! node's payload is encoded inside an isolate owned by the node's
//! project (or the build, for project-less lifecycle nodes), scoping
//! codec resolution to that owner.

use crate::error::CacheError;
use petgraph::graph::NodeIndex;
use quarry_codec::{
    CodecError, EncoderResolver, IsolateOwner, PayloadValue, ReadContext, WriteContext,
};
use quarry_common::ProjectPath;
use quarry_model::{HostError, WorkGraph, WorkNode};
use quarry_problems::{Problem, ProblemSink};
use std::any::Any;

/// Wire tag for payloads whose type had no codec at save time.
pub const UNSUPPORTED_PAYLOAD_TAG: &str = "quarry.unsupported";

/// Placeholder materialized for a payload that could not be serialized.
///
/// Carries the original type tag so hosts can report or reject it.
#[derive(Debug)]
pub struct UnsupportedPayload {
    /// The type tag the value had at save time.
    pub original_tag: String,
}

impl PayloadValue for UnsupportedPayload {
    fn type_tag(&self) -> &str {
        UNSUPPORTED_PAYLOAD_TAG
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Closes an ordered sequence of project paths under ancestry.
///
/// For every path, missing ancestors are inserted immediately before
/// the path itself, walking parent links iteratively, so that any
/// ancestor always precedes its descendants in the result and no path
/// appears twice. The ordering is a property of the insertion positions,
/// not of the container.
pub fn fill_gaps(paths: &[ProjectPath]) -> Vec<ProjectPath> {
    let mut closed: Vec<ProjectPath> = Vec::with_capacity(paths.len());
    for path in paths {
        let insert_at = closed.len();
        let mut parent = path.parent();
        while let Some(ancestor) = parent {
            if closed.contains(&ancestor) {
                break;
            }
            parent = ancestor.parent();
            closed.insert(insert_at, ancestor);
        }
        if !closed.contains(path) {
            closed.push(path.clone());
        }
    }
    closed
}

/// Writes the project-path sequence and the node graph.
///
/// Payload types without a codec in their scope are written as
/// placeholders and recorded in the problem sink instead of aborting
/// the save; hard codec faults still abort.
pub fn write_work_graph(
    ctx: &mut WriteContext<'_>,
    graph: &WorkGraph,
    resolver: &dyn EncoderResolver,
    problems: &ProblemSink,
) -> Result<(), CacheError> {
    let owners: Vec<ProjectPath> = graph
        .nodes()
        .filter_map(|(_, node)| node.project.clone())
        .collect();
    let closed = fill_gaps(&owners);
    ctx.write_collection(&closed, |ctx, path| ctx.write_string(path.as_str()))?;

    let nodes: Vec<NodeIndex> = graph.nodes().map(|(index, _)| index).collect();
    ctx.write_collection(&nodes, |ctx, index| {
        let node = graph.node(*index);
        match &node.project {
            Some(path) => {
                ctx.write_u8(1)?;
                ctx.write_string(path.as_str())?;
            }
            None => ctx.write_u8(0)?,
        }
        let owner = match &node.project {
            Some(path) => IsolateOwner::Project(path.clone()),
            None => IsolateOwner::Build,
        };
        let set = resolver.encoder_set_for(&owner);
        ctx.with_isolate(owner, set, |ctx| {
            write_payload_or_placeholder(ctx, node.payload.as_ref(), problems)
        })
    })?;

    let edges: Vec<(u32, u32)> = graph
        .edges()
        .map(|(dependent, dependency)| (dependent.index() as u32, dependency.index() as u32))
        .collect();
    ctx.write_collection(&edges, |ctx, (dependent, dependency)| {
        ctx.write_u32(*dependent)?;
        ctx.write_u32(*dependency)
    })?;
    Ok(())
}

/// Writes a tagged payload, substituting a placeholder record when the
/// active scope has no codec for its type.
pub fn write_payload_or_placeholder(
    ctx: &mut WriteContext<'_>,
    value: &dyn PayloadValue,
    problems: &ProblemSink,
) -> Result<(), CodecError> {
    let tag = value.type_tag().to_string();
    match ctx.resolve(&tag) {
        Ok(codec) => {
            ctx.write_string(&tag)?;
            codec.encode(value, ctx)
        }
        Err(CodecError::UnknownTag { .. }) => {
            let scope = match ctx.owner() {
                Some(owner) => owner.to_string(),
                None => "unscoped".to_string(),
            };
            problems.record(
                Problem::failure(format!(
                    "cannot serialize value of type '{tag}': no codec is registered"
                ))
                .with_trace(scope),
            );
            ctx.write_string(UNSUPPORTED_PAYLOAD_TAG)?;
            ctx.write_string(&tag)
        }
        Err(e) => Err(e),
    }
}

/// Reads a tagged payload written by [`write_payload_or_placeholder`].
pub fn read_payload_or_placeholder(
    ctx: &mut ReadContext<'_>,
) -> Result<Box<dyn PayloadValue>, CodecError> {
    let tag = ctx.read_string()?;
    if tag == UNSUPPORTED_PAYLOAD_TAG {
        let original_tag = ctx.read_string()?;
        return Ok(Box::new(UnsupportedPayload { original_tag }));
    }
    ctx.read_payload_with_tag(&tag)
}

/// Reads the project-path sequence and node graph written by
/// [`write_work_graph`].
///
/// Each project path is handed to `materialize` in sequence order, so
/// parents are always materialized before their children. Node owner
/// references are resolved against the materialized sequence; a
/// reference to an unlisted project is a malformed stream.
pub fn read_work_graph(
    ctx: &mut ReadContext<'_>,
    resolver: &dyn EncoderResolver,
    materialize: &mut dyn FnMut(&ProjectPath) -> Result<(), HostError>,
) -> Result<WorkGraph, CacheError> {
    let path_strings = ctx.read_collection(|ctx| ctx.read_string())?;
    let mut projects: Vec<ProjectPath> = Vec::with_capacity(path_strings.len());
    for raw in path_strings {
        let path: ProjectPath = raw
            .parse()
            .map_err(|e| CodecError::malformed(format!("invalid project path: {e}")))?;
        materialize(&path).map_err(CacheError::host)?;
        projects.push(path);
    }

    let nodes = ctx.read_collection(|ctx| {
        let project = match ctx.read_u8()? {
            0 => None,
            1 => {
                let path: ProjectPath = ctx
                    .read_string()?
                    .parse()
                    .map_err(|e| CodecError::malformed(format!("invalid project path: {e}")))?;
                if !projects.contains(&path) {
                    return Err(CodecError::malformed(format!(
                        "node references unlisted project '{path}'"
                    )));
                }
                Some(path)
            }
            other => {
                return Err(CodecError::malformed(format!(
                    "invalid project presence byte {other:#04x}"
                )))
            }
        };
        let owner = match &project {
            Some(path) => IsolateOwner::Project(path.clone()),
            None => IsolateOwner::Build,
        };
        let set = resolver.encoder_set_for(&owner);
        let payload = ctx.with_isolate(owner, set, read_payload_or_placeholder)?;
        Ok(WorkNode::new(payload, project))
    })?;

    let mut graph = WorkGraph::new();
    let indices: Vec<NodeIndex> = nodes.into_iter().map(|node| graph.add_node(node)).collect();

    let edges = ctx.read_collection(|ctx| {
        let dependent = ctx.read_u32()?;
        let dependency = ctx.read_u32()?;
        Ok((dependent, dependency))
    })?;
    for (dependent, dependency) in edges {
        let from = indices.get(dependent as usize).copied();
        let to = indices.get(dependency as usize).copied();
        match (from, to) {
            (Some(from), Some(to)) => graph.add_dependency(from, to),
            _ => {
                return Err(CodecError::malformed(format!(
                    "edge ({dependent}, {dependency}) references a node out of range"
                ))
                .into())
            }
        }
    }
    Ok(graph)
}
