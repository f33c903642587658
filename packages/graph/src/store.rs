//! JSON persistence for street graphs.
//!
//! Writes are all-or-nothing: the graph is serialized into a temporary
//! file next to the target and renamed over it, so readers never see a
//! half-written graph.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::GraphError;
use crate::model::{GraphDocument, StreetGraph};

/// Reads a graph from a JSON file and validates it.
///
/// # Errors
///
/// Returns [`GraphError::Io`] if the file cannot be opened,
/// [`GraphError::Json`] if it is not a valid graph document, and
/// [`GraphError::UnknownNode`] for dangling edges.
pub fn load_graph(path: &Path) -> Result<StreetGraph, GraphError> {
    let file = File::open(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: GraphDocument = serde_json::from_reader(BufReader::new(file))?;
    let graph = StreetGraph::try_from(document)?;

    log::info!(
        "Loaded graph {} ({} nodes, {} edges, {})",
        path.display(),
        graph.node_count(),
        graph.edge_count(),
        graph.crs_name()
    );
    Ok(graph)
}

/// Atomically writes a graph as JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`GraphError::Io`] if the directory, temp file or rename
/// fails, and [`GraphError::Json`] if serialization fails.
pub fn save_graph(graph: &StreetGraph, path: &Path) -> Result<(), GraphError> {
    let io_err = |source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer(&mut writer, graph)?;
        writer.flush().map_err(io_err)?;
    }
    temp.persist(path).map_err(|e| io_err(e.error))?;

    log::info!(
        "Saved graph {} ({} edges)",
        path.display(),
        graph.edge_count()
    );
    Ok(())
}
