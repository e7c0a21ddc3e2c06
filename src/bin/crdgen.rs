use balancer_operator::crd::balancer::Balancer;
use kube::core::CustomResourceExt;

fn main() {
    let crd = Balancer::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
