//! The `Member` gRPC service: a thin adapter from wire types to the
//! `MembershipObserver`/`MemberRpcHandler` seams `msg-node` implements.
//! Grounded on the original's `cluster/handler.go` remote dispatch entry
//! points and `cluster/node.go`'s NewMember/DelMember handling.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::member_server::Member as MemberTrait;
use crate::proto::{
    Ack, CloseSessionRequest, DelMemberRequest, NewMemberRequest, NotifyMessage,
    PerformConventionRequest, PerformConventionResponse, PushMessage, RequestMessage,
    ResponseMessage, SessionClosedRequest,
};
use crate::traits::{MemberRpcHandler, MembershipObserver};

pub struct MemberService {
    observer: Arc<dyn MembershipObserver>,
    rpc_handler: Arc<dyn MemberRpcHandler>,
}

impl MemberService {
    pub fn new(observer: Arc<dyn MembershipObserver>, rpc_handler: Arc<dyn MemberRpcHandler>) -> Self {
        MemberService { observer, rpc_handler }
    }
}

fn to_status(err: crate::error::ClusterError) -> Status {
    Status::internal(err.to_string())
}

#[tonic::async_trait]
impl MemberTrait for MemberService {
    async fn handle_request(&self, request: Request<RequestMessage>) -> Result<Response<Ack>, Status> {
        let m = request.into_inner();
        self.rpc_handler
            .handle_request(&m.gate_addr, m.session_id, m.id, m.uid, m.short_ver, &m.route, &m.data, &m.remote_addr)
            .await
            .map_err(to_status)?;
        Ok(Response::new(Ack {}))
    }

    async fn handle_notify(&self, request: Request<NotifyMessage>) -> Result<Response<Ack>, Status> {
        let m = request.into_inner();
        self.rpc_handler
            .handle_notify(&m.gate_addr, m.session_id, m.uid, m.short_ver, &m.route, &m.data, &m.remote_addr)
            .await
            .map_err(to_status)?;
        Ok(Response::new(Ack {}))
    }

    async fn handle_push(&self, request: Request<PushMessage>) -> Result<Response<Ack>, Status> {
        let m = request.into_inner();
        self.rpc_handler.handle_push(m.session_id, &m.route, &m.data).await.map_err(to_status)?;
        Ok(Response::new(Ack {}))
    }

    async fn handle_response(&self, request: Request<ResponseMessage>) -> Result<Response<Ack>, Status> {
        let m = request.into_inner();
        self.rpc_handler.handle_response(m.session_id, m.id, &m.route, &m.data).await.map_err(to_status)?;
        Ok(Response::new(Ack {}))
    }

    async fn new_member(&self, request: Request<NewMemberRequest>) -> Result<Response<Ack>, Status> {
        let member = request
            .into_inner()
            .member
            .ok_or_else(|| Status::invalid_argument("member is required"))?;
        self.observer.on_new_member(member.into()).await;
        Ok(Response::new(Ack {}))
    }

    async fn del_member(&self, request: Request<DelMemberRequest>) -> Result<Response<Ack>, Status> {
        self.observer.on_del_member(&request.into_inner().service_addr).await;
        Ok(Response::new(Ack {}))
    }

    async fn session_closed(&self, request: Request<SessionClosedRequest>) -> Result<Response<Ack>, Status> {
        self.rpc_handler.session_closed(request.into_inner().session_id).await;
        Ok(Response::new(Ack {}))
    }

    async fn close_session(&self, request: Request<CloseSessionRequest>) -> Result<Response<Ack>, Status> {
        self.rpc_handler.close_session(request.into_inner().session_id).await;
        Ok(Response::new(Ack {}))
    }

    async fn perform_convention(
        &self,
        request: Request<PerformConventionRequest>,
    ) -> Result<Response<PerformConventionResponse>, Status> {
        let m = request.into_inner();
        let payload = self.rpc_handler.perform_convention(m.signal, &m.payload).await;
        Ok(Response::new(PerformConventionResponse { payload }))
    }
}
