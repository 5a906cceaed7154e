#![allow(clippy::unwrap_used)]
use approx::assert_relative_eq;
use ndarray::array;
use neurarbor_core::{
    ConstructOptions, ListConfig, MeshNeuron, Neuron, NeuronId, NeuronKind, NeuronList,
    NeuronSource, NodeRow, NodeTable, TreeNeuron, Value,
};
use neurarbor_io::{load_dir, load_files, load_neuron, save_list, save_neuron, JsonLoader};

fn skeleton(id: i64) -> Neuron {
    let nodes = NodeTable::from_rows([
        NodeRow::new(1, -1, 0.0, 0.0, 0.0).with_radius(3.0),
        NodeRow::new(2, 1, 4.0, 0.0, 0.0),
        NodeRow::new(3, 2, 4.0, 3.0, 0.0),
    ])
    .unwrap();
    Neuron::Tree(
        TreeNeuron::new(nodes)
            .with_id(id)
            .with_name(format!("skeleton {id}"))
            .with_units("4 nm")
            .unwrap(),
    )
}

fn surface() -> Neuron {
    Neuron::Mesh(
        MeshNeuron::new(
            array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            array![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]],
        )
        .unwrap()
        .with_id("tetra"),
    )
}

#[test]
fn test_save_and_load_single_neuron() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("n.json");
    let original = skeleton(12);
    save_neuron(&original, &path).unwrap();

    let back = load_neuron(&path).unwrap();
    assert_eq!(back, original);
    assert_eq!(back.id(), &NeuronId::Int(12));
    assert_eq!(back.units(), original.units());
    assert_relative_eq!(
        back.as_tree().unwrap().cable_length(),
        original.as_tree().unwrap().cable_length()
    );
}

#[test]
fn test_directory_round_trip_keeps_variants() {
    let dir = tempfile::tempdir().unwrap();
    let nl = NeuronList::from_neurons([skeleton(1), skeleton(2), surface()]);
    let written = save_list(&nl, dir.path()).unwrap();
    assert_eq!(written.len(), 3);
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let config = ListConfig::default().with_threading(true).with_n_cores(2);
    let loaded = load_dir(dir.path(), config).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.is_mixed());
    // Sorted by file name: 1.json, 2.json, tetra.json.
    let kinds: Vec<NeuronKind> = loaded.iter().map(|n| n.read().kind()).collect();
    assert_eq!(kinds, [NeuronKind::Tree, NeuronKind::Tree, NeuronKind::Mesh]);
    assert_eq!(loaded.get(-1).unwrap().read().id(), &NeuronId::Str("tetra".into()));
}

#[test]
fn test_construct_options_apply_to_loaded_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.json");
    save_neuron(&skeleton(3), &path).unwrap();

    let config = ListConfig::default()
        .with_construct(ConstructOptions::default().with_attr("dataset", "test"));
    let nl = load_files([&path, &path], config).unwrap();
    assert_eq!(nl.len(), 2);
    assert!(nl.is_degenerated());
    assert_eq!(
        nl.values("dataset").unwrap(),
        [Value::from("test"), Value::from("test")]
    );
}

#[test]
fn test_bytes_source_through_neuron_constructor() {
    let json = neurarbor_core::NeuronRecord::from_neuron(&surface())
        .to_json()
        .unwrap();
    let opts = ConstructOptions::default().with_loader(JsonLoader::shared());
    let n = Neuron::new(NeuronSource::Bytes(json.into_bytes()), &opts).unwrap();
    assert_eq!(n.kind(), NeuronKind::Mesh);
    assert_eq!(n.as_mesh().unwrap().n_faces(), 4);
}

#[test]
fn test_source_without_loader_is_unsupported() {
    let err = Neuron::new(
        NeuronSource::Bytes(b"{}".to_vec()),
        &ConstructOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, neurarbor_core::Error::Unsupported(_)));
}
