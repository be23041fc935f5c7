use oprc_olm::registry::Registry;

fn main() {
    for crd in Registry::defaults().crds() {
        let yaml = serde_yaml::to_string(crd).expect("serialize CRD to YAML");
        println!("---\n{}", yaml);
    }
}
