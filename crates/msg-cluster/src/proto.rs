//! Generated gRPC types and service traits, from `proto/cluster.proto`.

tonic::include_proto!("relaymesh.cluster.v1");
